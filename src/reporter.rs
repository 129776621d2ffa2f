//! Once-per-interval rollover and status output.
//!
//! Each tick the reporter rolls the interval over, takes the resulting snapshot and the
//! live average in the same critical section, then formats and writes the status
//! lines with the lock released:
//!
//! ```text
//! #Smpl/s = 1000 Flash @ 10Hz avg = 1.197V dips = 4 Smpl ms[ 0.893, 1.210] avg 1.176/1000
//!  0:1.203 100:1.195 200:0.901 ...
//! ```

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::control::FrequencyReading;
use crate::error::{AppResult, SamplerError};
use crate::sampler::{SharedStream, StreamView};
use crate::shutdown::Shutdown;

/// Destination of the status lines; `tokio::io::stdout()` in the binary.
pub type ReportSink = Box<dyn AsyncWrite + Send + Unpin>;

/// One status record, rendered by its `Display` impl as two lines.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    /// Samples kept in the completed interval.
    pub samples: usize,
    /// Indicator frequency at report time.
    pub flash_hz: u32,
    /// Live smoothed voltage.
    pub average: f64,
    /// Dips in the completed interval.
    pub dips: u32,
    /// Lowest sample of the interval.
    pub min: f64,
    /// Highest sample of the interval.
    pub max: f64,
    /// Mean of the interval's samples.
    pub mean: f64,
    /// Evenly spaced `(index, volts)` pairs.
    pub points: Vec<(usize, f64)>,
}

impl StatusReport {
    /// Build the record for `view` with at most `subsample_points` points.
    pub fn from_view(view: &StreamView, flash_hz: u32, subsample_points: usize) -> Self {
        let snapshot = &view.snapshot;
        Self {
            samples: snapshot.len(),
            flash_hz,
            average: view.average,
            dips: snapshot.dip_count,
            min: snapshot.min,
            max: snapshot.max,
            mean: snapshot.mean,
            points: snapshot.subsample(subsample_points),
        }
    }
}

impl std::fmt::Display for StatusReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "#Smpl/s = {} Flash @ {}Hz avg = {:.3}V dips = {} Smpl ms[ {:.3}, {:.3}] avg {:.3}/{}",
            self.samples,
            self.flash_hz,
            self.average,
            self.dips,
            self.min,
            self.max,
            self.mean,
            self.samples
        )?;
        for (index, volts) in &self.points {
            write!(f, " {index}:{volts:.3}")?;
        }
        Ok(())
    }
}

/// Periodic rollover driver.
pub struct Reporter {
    stream: SharedStream,
    frequency: FrequencyReading,
    sink: ReportSink,
    period: Duration,
    subsample_points: usize,
    reports: u64,
}

impl Reporter {
    /// Reporter writing to `sink` every `period`.
    pub fn new(
        stream: SharedStream,
        frequency: FrequencyReading,
        sink: ReportSink,
        period: Duration,
        subsample_points: usize,
    ) -> Self {
        Self {
            stream,
            frequency,
            sink,
            period,
            subsample_points,
            reports: 0,
        }
    }

    /// Roll over and write one report.
    ///
    /// A failing sink is returned as an error; the rollover itself has already
    /// happened.
    pub async fn report_once(&mut self) -> AppResult<StatusReport> {
        let view = self.stream.rollover_view();
        let report = StatusReport::from_view(&view, self.frequency.hz(), self.subsample_points);
        self.reports += 1;

        let text = format!("{report}\n");
        self.emit(text.as_bytes())
            .await
            .map_err(|e| SamplerError::Output(format!("writing status report: {e}")))?;
        debug!(
            sequence = view.snapshot.sequence,
            samples = report.samples,
            dropped = view.snapshot.dropped,
            dips = report.dips,
            "Interval rolled over"
        );
        Ok(report)
    }

    async fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.sink.write_all(bytes).await?;
        self.sink.flush().await
    }

    /// Reports written so far.
    pub fn reports(&self) -> u64 {
        self.reports
    }

    /// Report every period until `shutdown` fires, then hand the reporter back so the
    /// caller can emit the final report once the sampler has stopped.
    pub async fn run(mut self, shutdown: Shutdown) -> Self {
        info!(period_ms = self.period.as_millis() as u64, "Reporter started");

        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.report_once().await {
                        warn!(error = %e, "Status report failed");
                    }
                }
                _ = shutdown.wait() => break,
            }
        }

        info!(reports = self.reports, "Reporter stopped");
        self
    }
}

impl std::fmt::Debug for Reporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporter")
            .field("period", &self.period)
            .field("subsample_points", &self.subsample_points)
            .field("reports", &self.reports)
            .finish_non_exhaustive()
    }
}

/// In-memory sink that appends into a shared buffer; clones see the same bytes.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(std::sync::Arc<parking_lot::Mutex<Vec<u8>>>);

impl SharedBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, lossily decoded.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

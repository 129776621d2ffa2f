//! Application assembly: one shared stream, three concurrent loops.
//!
//! [`LightSampler::start`] acquires everything that can fail at startup before any
//! loop runs: the UDP socket is bound first, then the output is put to its initial
//! frequency, and only then are the sampler thread, the reporter task and the query
//! server task started. An error at any of these steps drops whatever was acquired so
//! far and returns.
//!
//! Shutdown is cooperative. Once the [`Shutdown`] fires (SIGINT, SIGTERM or the `stop`
//! query), [`LightSampler::run_until_shutdown`] joins every loop, which releases the
//! voltage source and the socket, then emits one last report for the partial interval.
//! A final report that cannot be written is logged and does not fail the shutdown.

use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::SamplerConfig;
use crate::control::FrequencyControl;
use crate::error::{AppResult, SamplerError};
use crate::hardware::{FrequencyOutput, VoltageSource};
use crate::reporter::{ReportSink, Reporter};
use crate::sampler::{SamplerEngine, SamplerHandle, SamplerStats, SharedStream, StreamSettings};
use crate::server::QueryServer;
use crate::shutdown::Shutdown;

/// Counters gathered when the application stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Sampler loop counters.
    pub sampler: SamplerStats,
    /// Reports written, including the final one.
    pub reports: u64,
    /// Queries served.
    pub queries: u64,
}

/// A running light sampler.
pub struct LightSampler {
    stream: SharedStream,
    shutdown: Shutdown,
    frequency: FrequencyControl,
    local_addr: SocketAddr,
    sampler: SamplerHandle,
    reporter: JoinHandle<Reporter>,
    server: JoinHandle<u64>,
}

impl LightSampler {
    /// Acquire resources and start all loops.
    ///
    /// `source` and `output` are owned from here on; the source is released on the
    /// sampler thread when it stops. Status reports go to `sink`.
    pub async fn start(
        config: &SamplerConfig,
        source: Box<dyn VoltageSource>,
        output: Box<dyn FrequencyOutput>,
        sink: ReportSink,
        shutdown: Shutdown,
    ) -> AppResult<Self> {
        let settings = StreamSettings::from_config(config)?;
        let stream = SharedStream::new(settings);

        let server = QueryServer::bind(&config.server, stream.clone()).await?;
        let local_addr = server.local_addr()?;
        let frequency = FrequencyControl::new(output, &config.output)?;

        let sampler = SamplerEngine::new(stream.clone(), config.sampler.period(), shutdown.clone())
            .spawn(source)?;

        let reporter = Reporter::new(
            stream.clone(),
            frequency.reading(),
            sink,
            config.reporter.period(),
            config.reporter.subsample_points,
        );
        let reporter = tokio::spawn(reporter.run(shutdown.clone()));
        let server = tokio::spawn(server.run(shutdown.clone()));

        info!(
            %local_addr,
            period_us = config.sampler.period_us,
            capacity = settings.capacity,
            dip_mode = ?settings.dip_mode,
            "Light sampler started"
        );

        Ok(Self {
            stream,
            shutdown,
            frequency,
            local_addr,
            sampler,
            reporter,
            server,
        })
    }

    /// Address the query server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The shared sample stream.
    pub fn stream(&self) -> &SharedStream {
        &self.stream
    }

    /// Handle that stops this instance when triggered.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Flash frequency control, for external inputs such as an encoder.
    pub fn frequency(&mut self) -> &mut FrequencyControl {
        &mut self.frequency
    }

    /// Wait for a stop request, then shut down.
    pub async fn run_until_shutdown(self) -> AppResult<RunSummary> {
        self.shutdown.wait().await;
        self.join_all().await
    }

    /// Request a stop and shut down.
    pub async fn shutdown(self) -> AppResult<RunSummary> {
        self.shutdown.trigger();
        self.join_all().await
    }

    async fn join_all(self) -> AppResult<RunSummary> {
        let mut failures = Vec::new();
        let mut summary = RunSummary::default();

        let sampler = self.sampler;
        match tokio::task::spawn_blocking(move || sampler.join()).await {
            Ok(Ok(stats)) => summary.sampler = stats,
            Ok(Err(e)) => failures.push(e),
            Err(e) => failures.push(SamplerError::TaskJoin(format!("sampler: {e}"))),
        }

        match self.server.await {
            Ok(queries) => summary.queries = queries,
            Err(e) => failures.push(SamplerError::TaskJoin(format!("query server: {e}"))),
        }

        match self.reporter.await {
            Ok(mut reporter) => {
                // The sampler has stopped, so this covers the last partial interval.
                // Losing it (stdout closed) does not make the shutdown unclean.
                if let Err(e) = reporter.report_once().await {
                    warn!(error = %e, "Final status report not written");
                }
                summary.reports = reporter.reports();
            }
            Err(e) => failures.push(SamplerError::TaskJoin(format!("reporter: {e}"))),
        }

        drop(self.frequency);

        if failures.is_empty() {
            info!(
                ticks = summary.sampler.ticks,
                reports = summary.reports,
                queries = summary.queries,
                "Light sampler stopped"
            );
            Ok(summary)
        } else {
            for failure in &failures {
                error!(error = %failure, "Shutdown step failed");
            }
            Err(SamplerError::ShutdownFailed(failures))
        }
    }
}

impl std::fmt::Debug for LightSampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LightSampler")
            .field("local_addr", &self.local_addr)
            .field("frequency", &self.frequency)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{RecordingOutput, ScriptedSource};
    use crate::reporter::SharedBuffer;
    use std::pin::Pin;
    use std::sync::atomic::Ordering;
    use std::task::{Context, Poll};
    use tokio::io::AsyncWrite;

    /// Stdout redirected into a pipe nobody reads any more.
    struct ClosedStdout;

    impl AsyncWrite for ClosedStdout {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            Poll::Ready(Err(std::io::ErrorKind::BrokenPipe.into()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    fn test_config() -> SamplerConfig {
        let mut config = SamplerConfig::default();
        config.server.bind_addr = [127, 0, 0, 1].into();
        config.server.port = 0;
        config.reporter.period_ms = 50;
        config
    }

    #[tokio::test]
    async fn test_start_and_shutdown_releases_source() {
        let source = ScriptedSource::new(std::iter::repeat(1.0).take(1_000_000));
        let released = source.release_flag();
        let output = RecordingOutput::new();
        let sink = SharedBuffer::new();

        let app = LightSampler::start(
            &test_config(),
            Box::new(source),
            Box::new(output.clone()),
            Box::new(sink.clone()),
            Shutdown::new(),
        )
        .await
        .unwrap();
        assert_ne!(app.local_addr().port(), 0);

        tokio::time::sleep(std::time::Duration::from_millis(120)).await;
        let summary = app.shutdown().await.unwrap();

        assert!(released.load(Ordering::SeqCst));
        assert!(summary.sampler.ticks > 0);
        assert!(summary.reports >= 2);
        assert_eq!(
            sink.contents().matches("#Smpl/s").count() as u64,
            summary.reports
        );
        assert_eq!(output.applied(), vec![10]);
    }

    #[tokio::test]
    async fn test_bind_failure_starts_nothing() {
        let taken = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config();
        config.server.port = taken.local_addr().unwrap().port();

        let source = ScriptedSource::new([1.0]);
        let released = source.release_flag();
        let output = RecordingOutput::new();

        let result = LightSampler::start(
            &config,
            Box::new(source),
            Box::new(output.clone()),
            Box::new(SharedBuffer::new()),
            Shutdown::new(),
        )
        .await;

        assert!(matches!(result, Err(SamplerError::Bind { .. })));
        assert!(released.load(Ordering::SeqCst));
        assert!(output.applied().is_empty());
    }

    #[tokio::test]
    async fn test_frequency_changes_show_in_reports() {
        let sink = SharedBuffer::new();
        let mut app = LightSampler::start(
            &test_config(),
            Box::new(ScriptedSource::new([1.0; 10])),
            Box::new(RecordingOutput::new()),
            Box::new(sink.clone()),
            Shutdown::new(),
        )
        .await
        .unwrap();

        assert_eq!(app.frequency().adjust(2).unwrap(), 30);
        app.shutdown().await.unwrap();
        assert!(sink.contents().contains("Flash @ 30Hz"));
    }

    #[tokio::test]
    async fn test_unwritable_reports_do_not_fail_shutdown() {
        let source = ScriptedSource::new([1.0; 10]);
        let released = source.release_flag();
        let app = LightSampler::start(
            &test_config(),
            Box::new(source),
            Box::new(RecordingOutput::new()),
            Box::new(ClosedStdout),
            Shutdown::new(),
        )
        .await
        .unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(80)).await;
        let summary = app.shutdown().await.expect("shutdown stays clean");
        assert!(summary.reports >= 2);
        assert!(released.load(Ordering::SeqCst));
    }
}

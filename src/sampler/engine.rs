//! Sampler engine: the fixed-rate acquisition loop.
//!
//! The loop owns the [`VoltageSource`] and runs on a dedicated, named OS thread because
//! the source is a blocking call. Each tick:
//!
//! 1. read one voltage (outside the lock)
//! 2. apply it to the shared stream in one critical section (average, buffer, dips,
//!    count)
//! 3. sleep until the next tick deadline
//!
//! A failed read makes the tick a no-op. The loop checks the shutdown flag once per
//! tick, so it exits within one period of a stop request; the source is dropped on
//! the sampler thread before `join` returns.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

use crate::error::{AppResult, SamplerError};
use crate::hardware::VoltageSource;
use crate::sampler::state::SharedStream;
use crate::shutdown::Shutdown;

/// Failed reads are logged on the first occurrence and then every this many.
const FAILURE_LOG_EVERY: u64 = 1000;

/// Deadline-based periodic timer.
///
/// Deadlines advance by exactly one period, so sleep jitter does not accumulate. If
/// the loop falls more than a full period behind (a slow read), the schedule restarts
/// from now instead of bursting to catch up.
#[derive(Debug)]
pub struct Ticker {
    period: Duration,
    next: Instant,
}

impl Ticker {
    /// First deadline one period from now.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    /// Sleep until the next deadline.
    pub fn wait(&mut self) {
        let now = Instant::now();
        if now < self.next {
            thread::sleep(self.next - now);
            self.next += self.period;
        } else if now - self.next > self.period {
            self.next = now + self.period;
        } else {
            self.next += self.period;
        }
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }
}

/// Counters returned when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SamplerStats {
    /// Ticks executed.
    pub ticks: u64,
    /// Ticks whose read failed.
    pub failed_reads: u64,
    /// Samples not kept because the interval buffer was full.
    pub dropped: u64,
}

/// Configured, not yet running sampler.
pub struct SamplerEngine {
    stream: SharedStream,
    period: Duration,
    shutdown: Shutdown,
}

impl SamplerEngine {
    /// Sampler feeding `stream` every `period`, stopping on `shutdown`.
    pub fn new(stream: SharedStream, period: Duration, shutdown: Shutdown) -> Self {
        Self {
            stream,
            period,
            shutdown,
        }
    }

    /// Move `source` onto a new `sampler` thread and start ticking.
    pub fn spawn<S>(self, source: S) -> AppResult<SamplerHandle>
    where
        S: VoltageSource + 'static,
    {
        let thread = thread::Builder::new()
            .name("sampler".to_string())
            .spawn(move || self.run(source))?;
        Ok(SamplerHandle {
            thread: Some(thread),
        })
    }

    /// Run the loop on the current thread until shutdown.
    pub fn run<S: VoltageSource>(self, mut source: S) -> SamplerStats {
        info!(
            source = %source.describe(),
            period_us = self.period.as_micros() as u64,
            "Sampler started"
        );

        let mut ticker = Ticker::new(self.period);
        let mut stats = SamplerStats::default();

        while !self.shutdown.is_triggered() {
            stats.ticks += 1;
            match source.read_voltage() {
                Ok(volts) if volts.is_finite() => {
                    let outcome = self.stream.record(volts);
                    if !outcome.stored {
                        stats.dropped += 1;
                    }
                    if outcome.dip {
                        trace!(volts, average = outcome.average, "Dip started");
                    }
                }
                Ok(volts) => self.read_failed(&mut stats, &format!("non-finite reading {volts}")),
                Err(e) => self.read_failed(&mut stats, &e.to_string()),
            }
            ticker.wait();
        }

        drop(source);
        info!(
            ticks = stats.ticks,
            failed_reads = stats.failed_reads,
            dropped = stats.dropped,
            "Sampler stopped, voltage source released"
        );
        stats
    }

    fn read_failed(&self, stats: &mut SamplerStats, reason: &str) {
        stats.failed_reads += 1;
        let failures = stats.failed_reads;
        if failures == 1 || failures % FAILURE_LOG_EVERY == 0 {
            let err = SamplerError::Acquisition(reason.to_string());
            warn!(failures, error = %err, "Voltage read failed, skipping tick");
        } else {
            debug!(failures, reason, "Voltage read failed");
        }
    }
}

/// Handle to the running sampler thread.
#[derive(Debug)]
pub struct SamplerHandle {
    thread: Option<JoinHandle<SamplerStats>>,
}

impl SamplerHandle {
    /// Wait for the loop to exit. Call after triggering shutdown.
    pub fn join(mut self) -> AppResult<SamplerStats> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| SamplerError::TaskJoin("sampler".to_string())),
            None => Ok(SamplerStats::default()),
        }
    }

    /// `true` once the loop has returned.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::ScriptedSource;
    use crate::sampler::state::StreamSettings;
    use std::sync::atomic::Ordering;
    use tracing_test::traced_test;

    fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_ticker_keeps_cadence() {
        let mut ticker = Ticker::new(Duration::from_millis(2));
        let start = Instant::now();
        for _ in 0..10 {
            ticker.wait();
        }
        assert!(start.elapsed() >= Duration::from_millis(18));
        assert_eq!(ticker.period(), Duration::from_millis(2));
    }

    #[test]
    fn test_failed_reads_are_skipped() {
        let stream = SharedStream::new(StreamSettings::default());
        let shutdown = Shutdown::new();
        let source = ScriptedSource::from_readings([Some(1.0), None, Some(2.0), None, Some(3.0)]);
        let released = source.release_flag();

        let handle = SamplerEngine::new(stream.clone(), Duration::from_micros(200), shutdown.clone())
            .spawn(source)
            .unwrap();

        wait_until(|| stream.total_count() == 3);
        // Script is exhausted; further ticks fail and must not count.
        thread::sleep(Duration::from_millis(5));
        assert_eq!(stream.total_count(), 3);
        assert_eq!(stream.average(), {
            let a = 1.0;
            let a = 0.999 * a + (1.0 - 0.999) * 2.0;
            0.999 * a + (1.0 - 0.999) * 3.0
        });

        shutdown.trigger();
        let stats = handle.join().unwrap();
        assert!(stats.failed_reads >= 2);
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    #[traced_test]
    fn test_first_failure_is_logged() {
        let stream = SharedStream::new(StreamSettings::default());
        let shutdown = Shutdown::new();
        let stopper = {
            let stream = stream.clone();
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                wait_until(|| stream.total_count() == 1);
                shutdown.trigger();
            })
        };

        // Run on this thread so the events land in the test's capture scope
        let stats = SamplerEngine::new(stream.clone(), Duration::from_micros(200), shutdown)
            .run(ScriptedSource::from_readings([None, None, Some(1.0)]));
        stopper.join().unwrap();

        assert!(stats.failed_reads >= 2);
        assert!(logs_contain("Voltage read failed, skipping tick"));
        assert!(logs_contain("Sampler stopped"));
    }

    #[test]
    fn test_stops_within_a_period() {
        let stream = SharedStream::new(StreamSettings::default());
        let shutdown = Shutdown::new();
        let source = ScriptedSource::new(std::iter::repeat(1.0).take(100_000));
        let released = source.release_flag();

        let handle = SamplerEngine::new(stream.clone(), Duration::from_millis(1), shutdown.clone())
            .spawn(source)
            .unwrap();
        wait_until(|| stream.total_count() > 5);

        let asked = Instant::now();
        shutdown.trigger();
        wait_until(|| handle.is_finished());
        assert!(asked.elapsed() < Duration::from_millis(100));

        handle.join().unwrap();
        assert!(released.load(Ordering::SeqCst));
    }

    #[test]
    fn test_overflow_counted_in_stats() {
        let settings = StreamSettings {
            capacity: 2,
            ..Default::default()
        };
        let stream = SharedStream::new(settings);
        let shutdown = Shutdown::new();
        let handle = SamplerEngine::new(stream.clone(), Duration::from_micros(100), shutdown.clone())
            .spawn(ScriptedSource::new([1.0, 1.0, 1.0, 1.0, 1.0]))
            .unwrap();

        wait_until(|| stream.total_count() == 5);
        shutdown.trigger();
        let stats = handle.join().unwrap();
        assert_eq!(stats.dropped, 3);
        assert_eq!(stream.rollover().len(), 2);
    }
}

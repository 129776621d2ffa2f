//! Shared sample stream state and interval rollover.
//!
//! Exactly one [`SampleStream`] exists per process. It sits behind a single mutex in
//! [`SharedStream`], which is cloned into the sampler thread, the reporter and the query
//! server. Field groups have a single writer each:
//!
//! | Fields                                              | Writer            |
//! |-----------------------------------------------------|-------------------|
//! | total count, running average, current buffer, dips  | sampler tick      |
//! | completed-interval snapshot                         | reporter rollover |
//!
//! A tick and a rollover each happen under one lock acquisition, so readers never see
//! a half-applied update. The completed interval is published as an immutable
//! `Arc<IntervalSnapshot>`; readers clone the `Arc` under the lock and do all their
//! formatting after releasing it.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::config::SamplerConfig;
use crate::data::{IntervalBuffer, Pushed};
use crate::dips::{count_dips, DipConfig, DipDetector, DipMode};
use crate::error::AppResult;

/// Per-run parameters of the stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    /// Samples kept per interval.
    pub capacity: usize,
    /// Weight of the previous average in the exponential smoothing.
    pub smoothing_factor: f64,
    /// Dip hysteresis band.
    pub dips: DipConfig,
    /// Which detector form produces the interval dip count.
    pub dip_mode: DipMode,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            capacity: 2000,
            smoothing_factor: 0.999,
            dips: DipConfig::default(),
            dip_mode: DipMode::Online,
        }
    }
}

impl StreamSettings {
    /// Settings from the `[sampler]` and `[dips]` sections.
    pub fn from_config(config: &SamplerConfig) -> AppResult<Self> {
        Ok(Self {
            capacity: config.sampler.buffer_capacity,
            smoothing_factor: config.sampler.smoothing_factor,
            dips: config.dips.band()?,
            dip_mode: config.dips.mode,
        })
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickOutcome {
    /// Sample kept in the interval buffer (false once the buffer is full).
    pub stored: bool,
    /// Sample started a dip (online mode only).
    pub dip: bool,
    /// Running average after this sample.
    pub average: f64,
}

/// One completed interval, immutable once published.
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalSnapshot {
    /// Rollover number; 0 is the empty snapshot present before the first rollover.
    pub sequence: u64,
    samples: Vec<f64>,
    /// Dips counted during the interval.
    pub dip_count: u32,
    /// Lowest sample, 0.0 for an empty interval.
    pub min: f64,
    /// Highest sample, 0.0 for an empty interval.
    pub max: f64,
    /// Arithmetic mean of the samples, 0.0 for an empty interval.
    pub mean: f64,
    /// Samples taken during the interval but not kept (buffer full).
    pub dropped: u64,
}

impl IntervalSnapshot {
    /// Snapshot before any rollover.
    pub fn empty() -> Self {
        Self::from_interval(0, Vec::new(), 0, 0)
    }

    /// Build a snapshot and its statistics from one interval's samples.
    pub fn from_interval(sequence: u64, samples: Vec<f64>, dip_count: u32, dropped: u64) -> Self {
        let (min, max, sum) = samples.iter().fold(
            (f64::INFINITY, f64::NEG_INFINITY, 0.0),
            |(min, max, sum), &v| (min.min(v), max.max(v), sum + v),
        );
        let (min, max, mean) = if samples.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (min, max, sum / samples.len() as f64)
        };
        Self {
            sequence,
            samples,
            dip_count,
            min,
            max,
            mean,
            dropped,
        }
    }

    /// Samples of the interval, in acquisition order.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Number of samples; always `samples().len()`.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// `true` if the interval recorded nothing.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Up to `points` evenly spaced `(index, sample)` pairs, first sample included.
    pub fn subsample(&self, points: usize) -> Vec<(usize, f64)> {
        let n = self.samples.len();
        let k = points.min(n);
        (0..k)
            .map(|i| {
                let idx = i * n / k;
                (idx, self.samples[idx])
            })
            .collect()
    }
}

/// Live scalars plus the current snapshot, read under one lock.
#[derive(Debug, Clone)]
pub struct StreamView {
    /// Samples taken since start.
    pub total_count: u64,
    /// Smoothed voltage.
    pub average: f64,
    /// Samples buffered in the interval in progress.
    pub pending: usize,
    /// Last completed interval.
    pub snapshot: Arc<IntervalSnapshot>,
}

/// The process-wide sampling state.
#[derive(Debug)]
pub struct SampleStream {
    settings: StreamSettings,
    total_count: u64,
    running_average: f64,
    current: IntervalBuffer<f64>,
    current_averages: Option<IntervalBuffer<f64>>,
    detector: DipDetector,
    snapshot: Arc<IntervalSnapshot>,
}

impl SampleStream {
    /// Empty stream; the average is undefined until the first sample.
    pub fn new(settings: StreamSettings) -> Self {
        let current_averages = match settings.dip_mode {
            DipMode::Online => None,
            DipMode::Batch => Some(IntervalBuffer::with_capacity(settings.capacity)),
        };
        Self {
            settings,
            total_count: 0,
            running_average: 0.0,
            current: IntervalBuffer::with_capacity(settings.capacity),
            current_averages,
            detector: DipDetector::new(settings.dips),
            snapshot: Arc::new(IntervalSnapshot::empty()),
        }
    }

    /// Apply one sampler tick.
    pub fn record(&mut self, sample: f64) -> TickOutcome {
        self.running_average = if self.total_count == 0 {
            sample
        } else {
            let alpha = self.settings.smoothing_factor;
            alpha * self.running_average + (1.0 - alpha) * sample
        };
        let average = self.running_average;

        // Dips are counted over the stored pairs only, so both modes agree with history
        let (stored, dip) = match self.current.push(sample) {
            Pushed::Stored => match self.current_averages.as_mut() {
                Some(averages) => {
                    averages.push(average);
                    (true, false)
                }
                None => (true, self.detector.observe(sample, average)),
            },
            Pushed::Dropped(_) => (false, false),
        };

        self.total_count += 1;

        TickOutcome {
            stored,
            dip,
            average,
        }
    }

    /// Promote the interval in progress to the snapshot and start a new interval.
    pub fn rollover(&mut self) -> Arc<IntervalSnapshot> {
        let (samples, dropped) = self.current.take();
        let dip_count = match self.current_averages.as_mut() {
            Some(averages) => {
                let (averages, _) = averages.take();
                count_dips(&samples, &averages, &self.settings.dips)
            }
            None => self.detector.count(),
        };
        self.detector.reset();

        let snapshot = Arc::new(IntervalSnapshot::from_interval(
            self.snapshot.sequence + 1,
            samples,
            dip_count,
            dropped,
        ));
        self.snapshot = Arc::clone(&snapshot);
        snapshot
    }

    /// Samples taken since start.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Smoothed voltage (0.0 before the first sample).
    pub fn average(&self) -> f64 {
        self.running_average
    }

    /// Samples buffered in the interval in progress.
    pub fn pending(&self) -> usize {
        self.current.len()
    }

    /// Dips counted so far in the interval in progress (online mode).
    pub fn pending_dips(&self) -> u32 {
        self.detector.count()
    }

    /// Last completed interval.
    pub fn snapshot(&self) -> Arc<IntervalSnapshot> {
        Arc::clone(&self.snapshot)
    }

}

/// Cloneable handle to the single shared [`SampleStream`].
#[derive(Debug, Clone)]
pub struct SharedStream {
    inner: Arc<Mutex<SampleStream>>,
}

impl SharedStream {
    /// Create the stream.
    pub fn new(settings: StreamSettings) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SampleStream::new(settings))),
        }
    }

    /// Apply one sampler tick under the lock.
    pub fn record(&self, sample: f64) -> TickOutcome {
        self.inner.lock().record(sample)
    }

    /// Perform an interval rollover under the lock.
    pub fn rollover(&self) -> Arc<IntervalSnapshot> {
        self.inner.lock().rollover()
    }

    /// Consistent copy of the live scalars and the current snapshot.
    pub fn view(&self) -> StreamView {
        stream_view(&self.inner.lock())
    }

    /// Roll over, then read the view, in one critical section.
    pub fn rollover_view(&self) -> StreamView {
        let mut stream = self.inner.lock();
        stream.rollover();
        stream_view(&stream)
    }

    /// Last completed interval.
    pub fn snapshot(&self) -> Arc<IntervalSnapshot> {
        self.inner.lock().snapshot()
    }

    /// Samples taken since start.
    pub fn total_count(&self) -> u64 {
        self.inner.lock().total_count()
    }

    /// Smoothed voltage.
    pub fn average(&self) -> f64 {
        self.inner.lock().average()
    }
}

fn stream_view(stream: &SampleStream) -> StreamView {
    StreamView {
        total_count: stream.total_count(),
        average: stream.average(),
        pending: stream.pending(),
        snapshot: stream.snapshot(),
    }
}

//! Hysteresis dip detection.
//!
//! A dip is a transient drop of the light level below its smoothed average. Detection
//! uses a two-state machine so a noisy signal hovering around the trigger line is
//! counted once:
//!
//! ```text
//!              sample <= average - trigger_drop   (dip counted)
//!   AwaitingDip ──────────────────────────────────────────────▶ InDip
//!        ▲                                                        │
//!        └────────────────────────────────────────────────────────┘
//!              sample >= average - reset_drop
//! ```
//!
//! The transition table lives in [`transition`]. Both entry points fold over it:
//!
//! - [`DipDetector`] is fed one `(sample, average)` pair per sampler tick and keeps its
//!   state until the interval rolls over.
//! - [`count_dips`] replays a recorded interval from a fresh `AwaitingDip` state.
//!
//! For the same input sequence both return the same count.

use serde::{Deserialize, Serialize};

use crate::error::{AppResult, SamplerError};

/// Default drop below the average (volts) that triggers a dip.
pub const DEFAULT_TRIGGER_DROP: f64 = 0.10;

/// Default drop below the average (volts) the signal must recover to before re-arming.
pub const DEFAULT_RESET_DROP: f64 = 0.07;

/// Hysteresis band, relative to the smoothed average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DipConfig {
    /// Magnitude below the average required to trigger a dip.
    pub trigger_drop: f64,
    /// Magnitude below the average that must be recovered to before the next dip.
    pub reset_drop: f64,
}

impl DipConfig {
    /// Build a validated configuration.
    ///
    /// Both drops must be finite and positive, and `reset_drop` may not exceed
    /// `trigger_drop` (otherwise a single sample could trigger and reset at once).
    pub fn new(trigger_drop: f64, reset_drop: f64) -> AppResult<Self> {
        if !trigger_drop.is_finite() || trigger_drop <= 0.0 {
            return Err(SamplerError::Configuration(format!(
                "trigger_drop must be a positive number of volts, got {trigger_drop}"
            )));
        }
        if !reset_drop.is_finite() || reset_drop <= 0.0 {
            return Err(SamplerError::Configuration(format!(
                "reset_drop must be a positive number of volts, got {reset_drop}"
            )));
        }
        if reset_drop > trigger_drop {
            return Err(SamplerError::Configuration(format!(
                "reset_drop ({reset_drop}) must not exceed trigger_drop ({trigger_drop})"
            )));
        }
        Ok(Self {
            trigger_drop,
            reset_drop,
        })
    }
}

impl Default for DipConfig {
    fn default() -> Self {
        Self {
            trigger_drop: DEFAULT_TRIGGER_DROP,
            reset_drop: DEFAULT_RESET_DROP,
        }
    }
}

/// State of the hysteresis machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DipState {
    /// Armed: the next qualifying drop counts as a dip.
    #[default]
    AwaitingDip,
    /// Inside a dip: waiting for the signal to recover.
    InDip,
}

/// Which detector form produces the per-interval dip count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DipMode {
    /// Count incrementally on every sampler tick.
    #[default]
    Online,
    /// Record per-sample averages and count once at rollover.
    Batch,
}

/// Single step of the dip state machine.
///
/// Returns the next state and whether this sample started a new dip.
#[inline]
pub fn transition(state: DipState, sample: f64, average: f64, config: &DipConfig) -> (DipState, bool) {
    match state {
        DipState::AwaitingDip if sample <= average - config.trigger_drop => (DipState::InDip, true),
        DipState::InDip if sample >= average - config.reset_drop => (DipState::AwaitingDip, false),
        unchanged => (unchanged, false),
    }
}

/// Online detector, fed one pair at a time.
#[derive(Debug, Clone, Default)]
pub struct DipDetector {
    config: DipConfig,
    state: DipState,
    count: u32,
}

impl DipDetector {
    /// Fresh detector in `AwaitingDip` with a zero count.
    pub fn new(config: DipConfig) -> Self {
        Self {
            config,
            state: DipState::AwaitingDip,
            count: 0,
        }
    }

    /// Feed one sample with the average in effect for it. Returns `true` if a dip fired.
    pub fn observe(&mut self, sample: f64, average: f64) -> bool {
        let (next, fired) = transition(self.state, sample, average, &self.config);
        self.state = next;
        if fired {
            self.count = self.count.saturating_add(1);
        }
        fired
    }

    /// Dips counted since the last reset.
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Current machine state.
    pub fn state(&self) -> DipState {
        self.state
    }

    /// Start a new interval. Returns the count accumulated in the finished one.
    pub fn reset(&mut self) -> u32 {
        let finished = self.count;
        self.state = DipState::AwaitingDip;
        self.count = 0;
        finished
    }
}

/// Offline detector over one recorded interval.
///
/// `samples[i]` is paired with `averages[i]`; if the slices differ in length only the
/// common prefix is replayed.
pub fn count_dips(samples: &[f64], averages: &[f64], config: &DipConfig) -> u32 {
    samples
        .iter()
        .zip(averages)
        .fold((DipState::AwaitingDip, 0u32), |(state, count), (&sample, &average)| {
            let (next, fired) = transition(state, sample, average, config);
            (next, if fired { count.saturating_add(1) } else { count })
        })
        .1
}

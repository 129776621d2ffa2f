//! Indicator flash frequency.
//!
//! [`FrequencyControl`] is the single writer of the output frequency. External control
//! inputs (a rotary encoder, a test) call [`FrequencyControl::set`] or
//! [`FrequencyControl::adjust`]; the value is clamped to the configured range and
//! forwarded to the [`FrequencyOutput`] only when it actually changes. The current
//! value is published through a [`FrequencyReading`] so the reporter can print it
//! without touching the output device.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::config::OutputConfig;
use crate::error::{AppResult, SamplerError};
use crate::hardware::FrequencyOutput;

/// Read-only view of the applied frequency.
#[derive(Debug, Clone, Default)]
pub struct FrequencyReading(Arc<AtomicU32>);

impl FrequencyReading {
    /// Fixed value, for reports built without a live control.
    pub fn fixed(hz: u32) -> Self {
        Self(Arc::new(AtomicU32::new(hz)))
    }

    /// Last frequency applied to the output.
    pub fn hz(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Owner of the frequency output.
pub struct FrequencyControl {
    output: Box<dyn FrequencyOutput>,
    current: FrequencyReading,
    min_hz: u32,
    max_hz: u32,
    step_hz: u32,
}

impl FrequencyControl {
    /// Take ownership of `output` and apply the configured initial frequency.
    pub fn new(output: Box<dyn FrequencyOutput>, config: &OutputConfig) -> AppResult<Self> {
        if config.min_hz > config.max_hz {
            return Err(SamplerError::Configuration(format!(
                "output.min_hz ({}) exceeds output.max_hz ({})",
                config.min_hz, config.max_hz
            )));
        }
        let mut control = Self {
            output,
            current: FrequencyReading::default(),
            min_hz: config.min_hz,
            max_hz: config.max_hz,
            step_hz: config.step_hz,
        };
        let initial = control.clamp(i64::from(config.initial_hz));
        control.apply(initial)?;
        Ok(control)
    }

    /// Handle the reporter reads from.
    pub fn reading(&self) -> FrequencyReading {
        self.current.clone()
    }

    /// Frequency currently applied.
    pub fn current_hz(&self) -> u32 {
        self.current.hz()
    }

    /// Request an absolute frequency. Returns the value actually applied.
    pub fn set(&mut self, hz: u32) -> AppResult<u32> {
        let hz = self.clamp(i64::from(hz));
        if hz != self.current_hz() {
            self.apply(hz)?;
        }
        Ok(hz)
    }

    /// Move by `detents` steps of `step_hz` (negative slows down).
    pub fn adjust(&mut self, detents: i32) -> AppResult<u32> {
        let target = i64::from(self.current_hz()) + i64::from(detents) * i64::from(self.step_hz);
        let hz = self.clamp(target);
        if hz != self.current_hz() {
            self.apply(hz)?;
        }
        Ok(hz)
    }

    fn clamp(&self, hz: i64) -> u32 {
        // Bounds are u32, so the clamped value always fits
        hz.clamp(i64::from(self.min_hz), i64::from(self.max_hz)) as u32
    }

    fn apply(&mut self, hz: u32) -> AppResult<()> {
        self.output
            .set_output_frequency(hz)
            .map_err(|e| SamplerError::Output(format!("setting {hz} Hz: {e:#}")))?;
        let previous = self.current.0.swap(hz, Ordering::Relaxed);
        tracing::debug!(from = previous, to = hz, "Flash frequency changed");
        Ok(())
    }
}

impl std::fmt::Debug for FrequencyControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrequencyControl")
            .field("current_hz", &self.current_hz())
            .field("min_hz", &self.min_hz)
            .field("max_hz", &self.max_hz)
            .field("step_hz", &self.step_hz)
            .finish()
    }
}

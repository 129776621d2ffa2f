//! Mock Hardware Implementations
//!
//! Provides simulated devices for running the pipeline without a light sensor or PWM
//! header, and scripted devices for deterministic tests.
//!
//! # Available Mocks
//!
//! - `MockLightSensor` - ambient light level with noise and periodic shadow dips
//! - `ScriptedSource` - replays a fixed sequence of readings and failures
//! - `MockPwm` - accepts any frequency and logs it
//! - `RecordingOutput` - records every frequency it is asked to apply

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::hardware::capabilities::{FrequencyOutput, VoltageSource};

// =============================================================================
// MockLightSensor - Simulated Photoresistor
// =============================================================================

/// Simulated light sensor.
///
/// Produces a steady level with uniform noise. The last `dip_length` reads of every
/// `dip_every` drop by `dip_depth`, like a hand passing over the sensor, so a fresh
/// sensor starts at its baseline.
///
/// # Example
///
/// ```rust,ignore
/// let mut sensor = MockLightSensor::new();
/// let volts = sensor.read_voltage()?;
/// ```
pub struct MockLightSensor {
    rng: StdRng,
    baseline_volts: f64,
    noise_volts: f64,
    dip_every: u64,
    dip_length: u64,
    dip_depth_volts: f64,
    full_scale_volts: f64,
    reads: u64,
}

impl MockLightSensor {
    /// 1.2 V baseline, ±10 mV noise, a 0.3 V dip of 20 ms every 250 ms at 1 kHz.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Same profile with a fixed seed, for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            baseline_volts: 1.2,
            noise_volts: 0.01,
            dip_every: 250,
            dip_length: 20,
            dip_depth_volts: 0.3,
            full_scale_volts: 1.8,
            reads: 0,
        }
    }

    /// Change the dip pattern. `every == 0` disables dips.
    pub fn with_dips(mut self, every: u64, length: u64, depth_volts: f64) -> Self {
        self.dip_every = every;
        self.dip_length = length;
        self.dip_depth_volts = depth_volts;
        self
    }

    /// Change the noise amplitude.
    pub fn with_noise(mut self, volts: f64) -> Self {
        self.noise_volts = volts.abs();
        self
    }
}

impl Default for MockLightSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl VoltageSource for MockLightSensor {
    fn read_voltage(&mut self) -> Result<f64> {
        let in_dip = match self.dip_every {
            0 => false,
            every => self.reads % every >= every.saturating_sub(self.dip_length),
        };
        self.reads = self.reads.wrapping_add(1);

        let noise = if self.noise_volts > 0.0 {
            self.rng.gen_range(-self.noise_volts..=self.noise_volts)
        } else {
            0.0
        };
        let shadow = if in_dip { self.dip_depth_volts } else { 0.0 };

        Ok((self.baseline_volts + noise - shadow).clamp(0.0, self.full_scale_volts))
    }

    fn describe(&self) -> String {
        format!("mock light sensor ({:.3} V baseline)", self.baseline_volts)
    }
}

// =============================================================================
// ScriptedSource - Deterministic Replay
// =============================================================================

/// Replays readings in order. `None` entries are read failures.
///
/// Once the script is exhausted every read fails, so a sampler driven by it
/// records exactly the scripted successes. Dropping the source sets the flag
/// returned by [`release_flag`](Self::release_flag).
pub struct ScriptedSource {
    script: VecDeque<Option<f64>>,
    released: Arc<AtomicBool>,
}

impl ScriptedSource {
    /// Script of successful readings only.
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self::from_readings(values.into_iter().map(Some))
    }

    /// Script mixing readings (`Some`) and failures (`None`).
    pub fn from_readings(readings: impl IntoIterator<Item = Option<f64>>) -> Self {
        Self {
            script: readings.into_iter().collect(),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag set once this source has been dropped.
    pub fn release_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.released)
    }

    /// Readings not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl VoltageSource for ScriptedSource {
    fn read_voltage(&mut self) -> Result<f64> {
        match self.script.pop_front() {
            Some(Some(volts)) => Ok(volts),
            Some(None) => Err(anyhow!("scripted read failure")),
            None => Err(anyhow!("script exhausted")),
        }
    }

    fn describe(&self) -> String {
        format!("scripted source ({} readings left)", self.script.len())
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

// =============================================================================
// Frequency outputs
// =============================================================================

/// Output used when no PWM channel is configured.
#[derive(Debug, Default)]
pub struct MockPwm {
    current_hz: u32,
}

impl MockPwm {
    /// Output starting disabled.
    pub fn new() -> Self {
        Self::default()
    }
}

impl FrequencyOutput for MockPwm {
    fn set_output_frequency(&mut self, hz: u32) -> Result<()> {
        if hz != self.current_hz {
            tracing::debug!(from = self.current_hz, to = hz, "MockPwm: frequency change");
            self.current_hz = hz;
        }
        Ok(())
    }
}

/// Records every applied frequency; clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingOutput {
    applied: Arc<Mutex<Vec<u32>>>,
    fail: Arc<AtomicBool>,
}

impl RecordingOutput {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frequencies applied so far, oldest first.
    pub fn applied(&self) -> Vec<u32> {
        self.applied.lock().clone()
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.fail.store(failing, Ordering::SeqCst);
    }
}

impl FrequencyOutput for RecordingOutput {
    fn set_output_frequency(&mut self, hz: u32) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(anyhow!("output write rejected"));
        }
        self.applied.lock().push(hz);
        Ok(())
    }
}

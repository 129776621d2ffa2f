//! Linux sysfs devices.
//!
//! - [`IioVoltageSource`] reads a raw ADC channel exposed by the industrial I/O
//!   subsystem (`/sys/bus/iio/devices/iio:deviceN/in_voltageM_raw`) and scales it to
//!   volts.
//! - [`SysfsPwm`] drives a PWM channel directory (`period`, `duty_cycle`, `enable`)
//!   at 50% duty.
//!
//! Both keep the device open for their whole lifetime and release it on drop.

use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{AppResult, SamplerError};
use crate::hardware::capabilities::{FrequencyOutput, VoltageSource};

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// One IIO ADC channel.
pub struct IioVoltageSource {
    path: PathBuf,
    file: File,
    reference_volts: f64,
    max_raw: u32,
    text: String,
}

impl IioVoltageSource {
    /// Open the raw channel file.
    ///
    /// Failing to open it is a startup error: the pipeline cannot run without its
    /// source.
    pub fn open(path: impl AsRef<Path>, reference_volts: f64, max_raw: u32) -> AppResult<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path).map_err(|e| SamplerError::SourceUnavailable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if max_raw == 0 {
            return Err(SamplerError::Configuration(
                "ADC full-scale raw value must be non-zero".into(),
            ));
        }
        tracing::info!(path = %path.display(), "IIO voltage source opened");
        Ok(Self {
            path,
            file,
            reference_volts,
            max_raw,
            text: String::with_capacity(16),
        })
    }

    /// Scale a raw reading to volts.
    pub fn raw_to_volts(&self, raw: u32) -> f64 {
        f64::from(raw.min(self.max_raw)) / f64::from(self.max_raw) * self.reference_volts
    }
}

impl VoltageSource for IioVoltageSource {
    fn read_voltage(&mut self) -> Result<f64> {
        self.text.clear();
        self.file.seek(SeekFrom::Start(0))?;
        self.file
            .read_to_string(&mut self.text)
            .with_context(|| format!("reading {}", self.path.display()))?;
        let raw: u32 = self
            .text
            .trim()
            .parse()
            .map_err(|e| anyhow!("unparseable ADC value {:?}: {e}", self.text.trim()))?;
        Ok(self.raw_to_volts(raw))
    }

    fn describe(&self) -> String {
        format!("IIO ADC {}", self.path.display())
    }
}

/// PWM channel driven through sysfs attribute files.
pub struct SysfsPwm {
    dir: PathBuf,
    current_hz: Option<u32>,
}

impl SysfsPwm {
    /// Use an already exported PWM channel directory.
    pub fn open(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(SamplerError::Output(format!(
                "PWM channel directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self {
            dir,
            current_hz: None,
        })
    }

    fn write_attr(&self, name: &str, value: impl std::fmt::Display) -> Result<()> {
        let path = self.dir.join(name);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        write!(file, "{value}").with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }
}

impl FrequencyOutput for SysfsPwm {
    fn set_output_frequency(&mut self, hz: u32) -> Result<()> {
        if self.current_hz == Some(hz) {
            return Ok(());
        }
        if hz == 0 {
            self.write_attr("enable", 0)?;
            self.current_hz = Some(0);
            return Ok(());
        }

        let period_ns = NANOS_PER_SECOND / u64::from(hz);
        // duty_cycle must never exceed period, so clear it before shrinking the period
        self.write_attr("duty_cycle", 0)?;
        self.write_attr("period", period_ns)?;
        self.write_attr("duty_cycle", period_ns / 2)?;
        self.write_attr("enable", 1)?;
        self.current_hz = Some(hz);
        Ok(())
    }
}

impl Drop for SysfsPwm {
    fn drop(&mut self) {
        if let Err(e) = self.write_attr("enable", 0) {
            tracing::warn!(error = %e, "Failed to disable PWM output");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_iio_source_scales_raw_value() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in_voltage0_raw");
        fs::write(&path, "4095\n").unwrap();

        let mut source = IioVoltageSource::open(&path, 1.8, 4095).unwrap();
        assert!((source.read_voltage().unwrap() - 1.8).abs() < 1e-9);

        fs::write(&path, "0\n").unwrap();
        assert_eq!(source.read_voltage().unwrap(), 0.0);
    }

    #[test]
    fn test_iio_source_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in_voltage0_raw");
        fs::write(&path, "n/a").unwrap();

        let mut source = IioVoltageSource::open(&path, 1.8, 4095).unwrap();
        assert!(source.read_voltage().is_err());
    }

    #[test]
    fn test_missing_iio_file_is_fatal() {
        let result = IioVoltageSource::open("/nonexistent/in_voltage0_raw", 1.8, 4095);
        assert!(matches!(
            result,
            Err(SamplerError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn test_pwm_writes_period_and_duty() {
        let dir = tempfile::tempdir().unwrap();
        let mut pwm = SysfsPwm::open(dir.path()).unwrap();
        pwm.set_output_frequency(10).unwrap();

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("period"), "100000000");
        assert_eq!(read("duty_cycle"), "50000000");
        assert_eq!(read("enable"), "1");

        drop(pwm);
        assert_eq!(read("enable"), "0");
    }

    #[test]
    fn test_pwm_zero_disables() {
        let dir = tempfile::tempdir().unwrap();
        let mut pwm = SysfsPwm::open(dir.path()).unwrap();
        pwm.set_output_frequency(0).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("enable")).unwrap(),
            "0"
        );
    }
}

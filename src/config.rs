//! Configuration System using Figment
//!
//! Strongly-typed configuration for the sampler pipeline. Values are layered:
//! 1. Built-in defaults (`SamplerConfig::default()`)
//! 2. A TOML file (by default `config/light_sampler.toml`; a missing file is skipped)
//! 3. Environment variables prefixed with `LIGHT_SAMPLER_`, sections separated by `__`
//!
//! Command-line overrides are applied by the binary on top of the loaded value, after
//! which [`SamplerConfig::validate`] must pass before anything is started.
//!
//! # Example
//! ```no_run
//! use light_sampler::config::SamplerConfig;
//!
//! let config = SamplerConfig::load()?;
//! config.validate()?;
//! println!("Query port: {}", config.server.port);
//! # Ok::<(), light_sampler::error::SamplerError>(())
//! ```

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dips::{DipConfig, DipMode, DEFAULT_RESET_DROP, DEFAULT_TRIGGER_DROP};
use crate::error::{AppResult, SamplerError};
use crate::logging::LogFormat;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "config/light_sampler.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Sampling loop and voltage source
    pub sampler: SamplingConfig,
    /// Dip detection band
    pub dips: DipsConfig,
    /// Periodic status reporter
    pub reporter: ReporterConfig,
    /// UDP query server
    pub server: ServerConfig,
    /// Indicator light frequency output
    pub output: OutputConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "light-sampler".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

/// Which voltage source backs the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Simulated light sensor
    Mock,
    /// Linux IIO sysfs ADC channel
    Iio,
}

/// Sampling loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Tick period in microseconds
    pub period_us: u64,
    /// Exponential smoothing weight of the previous average, in [0, 1)
    pub smoothing_factor: f64,
    /// Samples kept per interval; later samples of the interval are dropped
    pub buffer_capacity: usize,
    /// Voltage source implementation
    pub source: SourceKind,
    /// Raw ADC file for the IIO source
    pub iio_path: PathBuf,
    /// Full-scale ADC voltage
    pub reference_volts: f64,
    /// Raw reading corresponding to `reference_volts`
    pub adc_max_raw: u32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            period_us: 1000,
            smoothing_factor: 0.999,
            buffer_capacity: 2000,
            source: SourceKind::Mock,
            iio_path: PathBuf::from("/sys/bus/iio/devices/iio:device0/in_voltage0_raw"),
            reference_volts: 1.8,
            adc_max_raw: 4095,
        }
    }
}

impl SamplingConfig {
    /// Tick period as a `Duration`.
    pub fn period(&self) -> Duration {
        Duration::from_micros(self.period_us)
    }
}

/// Dip detection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DipsConfig {
    /// Volts below the average that trigger a dip
    pub trigger_drop: f64,
    /// Volts below the average the signal must recover to
    pub reset_drop: f64,
    /// Online (per tick) or batch (per rollover) counting
    pub mode: DipMode,
}

impl Default for DipsConfig {
    fn default() -> Self {
        Self {
            trigger_drop: DEFAULT_TRIGGER_DROP,
            reset_drop: DEFAULT_RESET_DROP,
            mode: DipMode::Online,
        }
    }
}

impl DipsConfig {
    /// Validated hysteresis band.
    pub fn band(&self) -> AppResult<DipConfig> {
        DipConfig::new(self.trigger_drop, self.reset_drop)
    }
}

/// Reporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Rollover + report period in milliseconds
    pub period_ms: u64,
    /// Evenly spaced samples printed per report
    pub subsample_points: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            period_ms: 1000,
            subsample_points: 10,
        }
    }
}

impl ReporterConfig {
    /// Report period as a `Duration`.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

/// Query server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind
    pub bind_addr: IpAddr,
    /// UDP port
    pub port: u16,
    /// Maximum characters of an unknown command echoed back
    pub max_echo_len: usize,
    /// Seconds after which a silent peer's last command is forgotten
    pub session_idle_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 12345,
            max_echo_len: 100,
            session_idle_secs: 300,
        }
    }
}

impl ServerConfig {
    /// Socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}

/// Indicator light output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Frequency applied at startup
    pub initial_hz: u32,
    /// Lowest allowed frequency
    pub min_hz: u32,
    /// Highest allowed frequency
    pub max_hz: u32,
    /// Change per encoder detent
    pub step_hz: u32,
    /// Sysfs PWM channel directory; `None` keeps the output simulated
    pub pwm_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            initial_hz: 10,
            min_hz: 1,
            max_hz: 1000,
            step_hz: 10,
            pwm_path: None,
        }
    }
}

impl SamplerConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override the file with prefix `LIGHT_SAMPLER_`.
    /// Example: `LIGHT_SAMPLER_SERVER__PORT=5555`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Self::figment(path.as_ref()).extract()?;
        Ok(config)
    }

    /// Provider chain used by [`load_from`](Self::load_from).
    pub fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(SamplerConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("LIGHT_SAMPLER_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(SamplerError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let sampler = &self.sampler;
        if sampler.period_us == 0 {
            return invalid("sampler.period_us must be greater than zero".into());
        }
        if !(0.0..1.0).contains(&sampler.smoothing_factor) {
            return invalid(format!(
                "sampler.smoothing_factor {} must be in [0, 1)",
                sampler.smoothing_factor
            ));
        }
        if sampler.buffer_capacity == 0 {
            return invalid("sampler.buffer_capacity must be greater than zero".into());
        }
        if sampler.source == SourceKind::Iio {
            if !(sampler.reference_volts.is_finite() && sampler.reference_volts > 0.0) {
                return invalid(format!(
                    "sampler.reference_volts {} must be positive",
                    sampler.reference_volts
                ));
            }
            if sampler.adc_max_raw == 0 {
                return invalid("sampler.adc_max_raw must be greater than zero".into());
            }
        }

        self.dips.band()?;

        if self.reporter.period_ms == 0 {
            return invalid("reporter.period_ms must be greater than zero".into());
        }
        if self.reporter.subsample_points == 0 {
            return invalid("reporter.subsample_points must be greater than zero".into());
        }

        let output = &self.output;
        if output.min_hz == 0 || output.min_hz > output.max_hz {
            return invalid(format!(
                "output range [{}, {}] Hz is empty or starts at zero",
                output.min_hz, output.max_hz
            ));
        }
        if !(output.min_hz..=output.max_hz).contains(&output.initial_hz) {
            return invalid(format!(
                "output.initial_hz {} outside [{}, {}]",
                output.initial_hz, output.min_hz, output.max_hz
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = SamplerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.sampler.buffer_capacity, 2000);
        assert_eq!(config.dips.trigger_drop, 0.10);
        assert_eq!(config.dips.reset_drop, 0.07);
        assert_eq!(config.server.socket_addr().port(), 12345);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [server]
            port = 5555

            [dips]
            trigger_drop = 0.2
            reset_drop = 0.1
            mode = "batch"
            "#
        )
        .unwrap();

        let config = SamplerConfig::load_from(file.path()).unwrap();
        assert_eq!(config.server.port, 5555);
        assert_eq!(config.dips.mode, DipMode::Batch);
        assert_eq!(config.dips.trigger_drop, 0.2);
        assert_eq!(config.sampler.period_us, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let config = SamplerConfig::figment(Path::new("does/not/exist.toml"))
            .extract::<SamplerConfig>()
            .unwrap();
        assert_eq!(config.application.name, "light-sampler");
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = SamplerConfig::default();
        config.application.log_level = "invalid".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reset_above_trigger_rejected() {
        let mut config = SamplerConfig::default();
        config.dips.reset_drop = 0.2;
        assert!(matches!(
            config.validate(),
            Err(SamplerError::Configuration(_))
        ));
    }

    #[test]
    fn test_smoothing_factor_range() {
        let mut config = SamplerConfig::default();
        config.sampler.smoothing_factor = 1.0;
        assert!(config.validate().is_err());
        config.sampler.smoothing_factor = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_initial_frequency_outside_range() {
        let mut config = SamplerConfig::default();
        config.output.initial_hz = 5000;
        assert!(config.validate().is_err());
    }
}

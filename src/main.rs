//! CLI Entry Point for light_sampler
//!
//! Starts the sampling pipeline: the sampler thread, the once-per-second reporter
//! (status lines on stdout) and the UDP query server. Diagnostics go to stderr.
//!
//! # Usage
//!
//! Run against the simulated sensor:
//! ```bash
//! light_sampler
//! ```
//!
//! Run against a real ADC channel with a PWM indicator:
//! ```bash
//! LIGHT_SAMPLER_OUTPUT__PWM_PATH=/sys/class/pwm/pwmchip0/pwm0 \
//!     light_sampler --source iio --port 12345
//! ```
//!
//! Query it:
//! ```bash
//! echo count | nc -u -w1 localhost 12345
//! ```

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use light_sampler::app::LightSampler;
use light_sampler::config::{SamplerConfig, SourceKind};
use light_sampler::dips::DipMode;
use light_sampler::hardware::{
    FrequencyOutput, IioVoltageSource, MockLightSensor, MockPwm, SysfsPwm, VoltageSource,
};
use light_sampler::logging;
use light_sampler::shutdown::Shutdown;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "light_sampler")]
#[command(about = "Light sensor sampler with dip detection and a UDP query server", long_about = None)]
struct Cli {
    /// Configuration file (missing file means built-in defaults)
    #[arg(long, default_value = light_sampler::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// UDP port for queries
    #[arg(long)]
    port: Option<u16>,

    /// Voltage source
    #[arg(long, value_enum)]
    source: Option<SourceArg>,

    /// Drop below the average (V) that starts a dip
    #[arg(long)]
    trigger: Option<f64>,

    /// Drop below the average (V) that re-arms the detector
    #[arg(long)]
    reset: Option<f64>,

    /// How the per-interval dip count is computed
    #[arg(long, value_enum)]
    dip_mode: Option<DipModeArg>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceArg {
    Mock,
    Iio,
}

#[derive(Clone, Copy, ValueEnum)]
enum DipModeArg {
    Online,
    Batch,
}

impl Cli {
    fn apply(&self, config: &mut SamplerConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(source) = self.source {
            config.sampler.source = match source {
                SourceArg::Mock => SourceKind::Mock,
                SourceArg::Iio => SourceKind::Iio,
            };
        }
        if let Some(trigger) = self.trigger {
            config.dips.trigger_drop = trigger;
        }
        if let Some(reset) = self.reset {
            config.dips.reset_drop = reset;
        }
        if let Some(mode) = self.dip_mode {
            config.dips.mode = match mode {
                DipModeArg::Online => DipMode::Online,
                DipModeArg::Batch => DipMode::Batch,
            };
        }
        if let Some(level) = &self.log_level {
            config.application.log_level = level.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = SamplerConfig::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    cli.apply(&mut config);
    config.validate()?;
    logging::init_from_config(&config)?;

    eprintln!("💡 {} - light sensor sampler", config.application.name);

    let source = open_source(&config)?;
    let output = open_output(&config)?;

    let app = LightSampler::start(
        &config,
        source,
        output,
        Box::new(tokio::io::stdout()),
        Shutdown::new(),
    )
    .await?;

    // SIGINT and SIGTERM do what the `stop` query does
    app.shutdown_handle()
        .watch_signals()
        .context("installing signal handlers")?;

    eprintln!("📡 Listening for queries on udp://{}", app.local_addr());
    eprintln!("   Send 'help' for commands, 'stop' or Ctrl+C to quit");

    let summary = app
        .run_until_shutdown()
        .await
        .map_err(|e| anyhow::anyhow!(e.describe()))?;
    eprintln!(
        "👋 Shut down cleanly after {} samples and {} queries",
        summary.sampler.ticks - summary.sampler.failed_reads,
        summary.queries
    );
    Ok(())
}

fn open_source(config: &SamplerConfig) -> Result<Box<dyn VoltageSource>> {
    let sampler = &config.sampler;
    let source: Box<dyn VoltageSource> = match sampler.source {
        SourceKind::Mock => Box::new(MockLightSensor::new()),
        SourceKind::Iio => Box::new(IioVoltageSource::open(
            &sampler.iio_path,
            sampler.reference_volts,
            sampler.adc_max_raw,
        )?),
    };
    Ok(source)
}

fn open_output(config: &SamplerConfig) -> Result<Box<dyn FrequencyOutput>> {
    let output: Box<dyn FrequencyOutput> = match &config.output.pwm_path {
        Some(path) => Box::new(SysfsPwm::open(path)?),
        None => Box::new(MockPwm::new()),
    };
    Ok(output)
}

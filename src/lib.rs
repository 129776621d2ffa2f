//! # Light Sampler Core Library
//!
//! This crate samples a light sensor at a fixed rate, tracks a smoothed average, counts
//! hysteresis-qualified dips, and publishes one completed interval per second to a status
//! reporter and a UDP query server. The binary (`main.rs`) wires it to real or simulated
//! hardware.
//!
//! ## Crate Structure
//!
//! - **`app`**: `LightSampler`, which acquires resources, starts the three loops and joins
//!   them on shutdown.
//! - **`config`**: figment-based configuration (defaults, TOML file, environment).
//! - **`control`**: `FrequencyControl`, the single writer of the indicator frequency.
//! - **`data`**: the bounded `IntervalBuffer` with push-or-reject semantics.
//! - **`dips`**: the pure dip transition function and its online and batch drivers.
//! - **`error`**: the `SamplerError` enum used across the crate.
//! - **`hardware`**: `VoltageSource` and `FrequencyOutput` traits, sysfs devices and mocks.
//! - **`logging`**: tracing subscriber setup.
//! - **`reporter`**: the periodic rollover and status line output.
//! - **`sampler`**: the shared sample stream and the acquisition thread.
//! - **`server`**: the UDP text query protocol.
//! - **`shutdown`**: the process-wide stop signal.

pub mod app;
pub mod config;
pub mod control;
pub mod data;
pub mod dips;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod reporter;
pub mod sampler;
pub mod server;
pub mod shutdown;

pub use app::{LightSampler, RunSummary};
pub use config::SamplerConfig;
pub use error::{AppResult, SamplerError};

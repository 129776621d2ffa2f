//! Custom error types for the application.
//!
//! This module defines the primary error type, `SamplerError`, for the whole pipeline.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the failures that can occur, from configuration issues to the voltage source and
//! the query transport.
//!
//! ## Error Hierarchy
//!
//! `SamplerError` separates failures by where they are handled:
//!
//! - **Startup (fatal)**: `Config`, `Configuration`, `SourceUnavailable` and `Bind`. The
//!   process must not continue half-initialized; these surface once in `main` and the
//!   process exits non-zero.
//! - **Transient**: `Acquisition` is produced by a failed voltage read. The sampler loop
//!   absorbs it (the tick becomes a no-op) and only logs it.
//! - **Shutdown**: `TaskJoin` and `ShutdownFailed` report loops that could not be joined
//!   cleanly. Every other resource is still released before they are returned.
//!
//! Malformed or unknown queries are not errors at all: they are answered to the peer
//! with an "Unknown command" response.

use std::net::SocketAddr;
use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, SamplerError>;

#[allow(missing_docs)]
#[derive(Error, Debug)]
pub enum SamplerError {
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Voltage acquisition failed: {0}")]
    Acquisition(String),

    #[error("Voltage source '{path}' unavailable: {message}")]
    SourceUnavailable { path: String, message: String },

    #[error("Failed to bind query server on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Output frequency update failed: {0}")]
    Output(String),

    #[error("Task '{0}' could not be joined")]
    TaskJoin(String),

    #[error("Shutdown failed with errors")]
    ShutdownFailed(Vec<SamplerError>),
}

impl SamplerError {
    /// Flattened, human-readable description including nested shutdown failures.
    pub fn describe(&self) -> String {
        match self {
            SamplerError::ShutdownFailed(errors) => {
                let combined = errors
                    .iter()
                    .map(|err| err.describe())
                    .collect::<Vec<_>>()
                    .join("; ");
                format!("Shutdown failed: {combined}")
            }
            other => other.to_string(),
        }
    }
}

//! Custom error types for the application.
//!
//! This module defines the primary error type, `ScanError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to classify the faults a sweep can end with.
//!
//! ## Fault classes
//!
//! - **`Actuator`**: the turntable rejected a command or reported an invalid
//!   state. Fatal, aborts the sweep.
//! - **`Sensor`**: the analyzer connection dropped or a reading was unusable
//!   (NaN, empty trace). Fatal, aborts the sweep.
//! - **`Setup`**: homing never converged, so the sweep never started.
//! - **`Config`** / **`Configuration`**: file-level load failures versus
//!   semantic validation failures (values that parse but are wrong).
//!
//! Recovered conditions (a wait timeout, an illegal position reading) are not
//! represented here. They never propagate past the orchestrator and are only
//! observable through the log trail.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, ScanError>;

/// Terminal faults a sweep can surface to its caller.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("configuration load error: {0}")]
    Config(#[from] figment::Error),

    #[error("configuration validation error: {0}")]
    Configuration(String),

    #[error("actuator fault: {0}")]
    Actuator(#[source] anyhow::Error),

    #[error("sensor fault: {0}")]
    Sensor(#[source] anyhow::Error),

    #[error("setup fault: {0}")]
    Setup(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("scan worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

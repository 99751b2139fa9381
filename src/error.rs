//! Error types for pullcord

use thiserror::Error;

/// Errors raised by the navigation engine itself.
///
/// Every variant is scoped to the call that detected it; the engine never
/// retries and never treats one of these as process-ending.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    #[error("invalid segment: {0}")]
    InvalidSegment(String),

    #[error("trip has no segments")]
    EmptyTrip,

    #[error("navigation has not been started")]
    NotStarted,

    #[error("trip already finished; start a new controller for a new trip")]
    AlreadyFinished,

    #[error("invalid fix: {0}")]
    InvalidFix(String),

    #[error("invalid proximity config: {0}")]
    InvalidConfig(String),
}

/// Crate-level error for everything around the engine: config files,
/// recordings, telemetry output and the worker task.
#[derive(Error, Debug)]
pub enum PullcordError {
    #[error(transparent)]
    Nav(#[from] NavError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Recording line {line}: {reason}")]
    Recording { line: u64, reason: String },

    #[error("Navigator task is no longer running")]
    WorkerClosed,
}

impl From<toml::de::Error> for PullcordError {
    fn from(e: toml::de::Error) -> Self {
        PullcordError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PullcordError>;

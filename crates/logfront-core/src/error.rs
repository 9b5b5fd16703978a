//! Error types for logfront-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid duration: {0}")]
    InvalidDuration(String),

    #[error("Invalid time range: start {start} > end {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("Empty query")]
    EmptyQuery,

    #[error("Invalid limits: {0}")]
    InvalidLimits(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Deserialization(e.to_string())
    }
}

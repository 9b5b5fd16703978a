//! Schema error types

use thiserror::Error;

/// Schema errors
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Invalid period start date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Schema periods out of order: period {index} starts at {from}, not after {previous}")]
    OutOfOrder {
        index: usize,
        from: String,
        previous: String,
    },

    #[error("Schema config has no periods")]
    Empty,

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

impl From<serde_yaml::Error> for SchemaError {
    fn from(e: serde_yaml::Error) -> Self {
        SchemaError::Configuration(e.to_string())
    }
}

//! Query frontend error types

use logfront_core::{format_duration, CoreError, Timestamp};
use logfront_schema::SchemaError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Granularity a size limit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeScope {
    /// The whole, unsplit query
    Query,
    /// A single split sub-query
    Querier,
}

impl fmt::Display for SizeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeScope::Query => write!(f, "query"),
            SizeScope::Querier => write!(f, "querier"),
        }
    }
}

/// Query frontend errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(
        "{scope} would read {} which exceeds the limit of {}; use more specific stream selectors or a shorter time range",
        format_bytes(*.estimated),
        format_bytes(*.limit)
    )]
    QueryTooLarge {
        scope: SizeScope,
        estimated: u64,
        limit: u64,
    },

    #[error("maximum number of series ({limit}) reached for a single query")]
    SeriesLimitExceeded { limit: usize },

    #[error(
        "query time range {} exceeds the limit of {}",
        format_duration(*.length),
        format_duration(*.limit)
    )]
    QueryTooLong { length: Duration, limit: Duration },

    #[error("query ends at {end}, before the look-back bound {bound}")]
    ExceedsLookback { end: Timestamp, bound: Timestamp },

    #[error("querying is disabled for tenant '{tenant}'")]
    ParallelismDisabled { tenant: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Index stats error: {0}")]
    Stats(String),

    #[error("{stage}: {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<QueryError>,
    },

    #[error("Query cancelled")]
    Cancelled,

    #[error("Query deadline exceeded")]
    DeadlineExceeded,

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for frontend operations
pub type Result<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Attribute this error to a pipeline stage.
    ///
    /// Admission rejections and cancellation are returned unchanged.
    pub fn in_stage(self, stage: &'static str) -> Self {
        if self.is_admission_rejection() || self.is_cancellation() {
            return self;
        }
        QueryError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any stage wrapping
    pub fn root(&self) -> &QueryError {
        let mut err = self;
        while let QueryError::Stage { source, .. } = err {
            err = source;
        }
        err
    }

    /// Rejected before expensive work because of a tenant limit
    pub fn is_admission_rejection(&self) -> bool {
        matches!(
            self.root(),
            QueryError::QueryTooLarge { .. }
                | QueryError::SeriesLimitExceeded { .. }
                | QueryError::QueryTooLong { .. }
                | QueryError::ExceedsLookback { .. }
                | QueryError::ParallelismDisabled { .. }
        )
    }

    /// Caller cancellation or deadline expiry
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self.root(),
            QueryError::Cancelled | QueryError::DeadlineExceeded
        )
    }

    /// Errors the caller should treat as a bad request
    pub fn is_client_error(&self) -> bool {
        self.is_admission_rejection() || matches!(self.root(), QueryError::InvalidRequest(_))
    }
}

/// Render a byte count with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

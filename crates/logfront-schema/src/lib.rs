//! logfront Schema - historical storage schema periods
//!
//! This crate describes which storage backend serves which slice of time:
//! - `PeriodConfig`: one schema period starting at a UTC day boundary
//! - `IndexType`: the index backend tag of a period
//! - `SchemaConfig`: the YAML-loadable list of periods
//! - `SchemaTimeline`: ordered, validated periods with range lookups

pub mod error;
pub mod period;
pub mod timeline;

pub use error::{Result, SchemaError};
pub use period::{DayTime, IndexType, PeriodConfig};
pub use timeline::{PeriodOverlap, SchemaConfig, SchemaTimeline};

//! logfront Core - shared types for the log query frontend
//!
//! This crate provides the types every other logfront crate builds on:
//! - `Timestamp` / `TimeRange`: millisecond instants and half-open ranges
//! - `Request`: one range or instant log query as received by the frontend
//! - `Response`: merged series/stream results plus per-request statistics
//! - `IndexStats`: cheap cost estimate returned by the statistics path
//! - `TenantLimits` / `LimitsSource`: per-tenant admission and scheduling limits
//! - `Clock`: injectable wall clock used for look-back bounds

pub mod clock;
pub mod duration;
pub mod error;
pub mod limits;
pub mod types;

pub use clock::{Clock, FixedClock, SystemClock};
pub use duration::{duration_millis, format_duration, parse_duration};
pub use error::{CoreError, Result};
pub use limits::{
    LimitsOverride, LimitsSource, ReloadableLimits, SplitOverride, StaticLimits, TenantLimits,
};
pub use types::*;

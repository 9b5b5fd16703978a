//! logfront Frontend - admission control and fan-out for log queries
//!
//! A request passes through a chain of [`Middleware`]s before it reaches
//! the query engine:
//! - `QueryLimits`: look-back clipping and maximum query length
//! - `SizeLimiter`: byte budgets checked against index statistics, once for
//!   the whole query and once per split sub-query
//! - `SeriesLimiter`: distinct series cap, checked while sub-queries complete
//! - `SplitByInterval`: interval-aligned splitting executed with a
//!   parallelism weighted by the schema periods the query touches
//!
//! [`FrontendBuilder`] assembles the default chain.

pub mod builder;
pub mod cache_key;
pub mod context;
pub mod error;
pub mod executor;
pub mod handler;
pub mod matchers;
pub mod merge;
pub mod parallelism;
pub mod query_limits;
pub mod series_limit;
pub mod size_limit;
pub mod split;

pub use builder::{FrontendBuilder, FrontendConfig};
pub use cache_key::{cache_key, normalize_query, CacheKeyGenerator};
pub use context::Context;
pub use error::{format_bytes, QueryError, Result, SizeScope};
pub use executor::{execute_requests, execute_stats, execute_with};
pub use handler::{handler_fn, stats_fn, Handler, Middleware, MiddlewareChain, StatsHandler};
pub use matchers::{extract_matcher_groups, MatcherGroup};
pub use merge::merge_responses;
pub use parallelism::weighted_parallelism;
pub use query_limits::QueryLimits;
pub use series_limit::{SeriesLimiter, SeriesTracker};
pub use size_limit::{SizeLimiter, SizeLimiterDeps, DEFAULT_STATS_CONCURRENCY};
pub use split::{split_by_interval, split_interval, SplitByInterval};

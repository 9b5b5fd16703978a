//! Assembly of the default middleware chain

use crate::cache_key::CacheKeyGenerator;
use crate::handler::{Handler, MiddlewareChain, StatsHandler};
use crate::query_limits::QueryLimits;
use crate::series_limit::SeriesLimiter;
use crate::size_limit::{SizeLimiter, SizeLimiterDeps, DEFAULT_STATS_CONCURRENCY};
use crate::split::SplitByInterval;
use logfront_core::duration::serde_duration;
use logfront_core::{Clock, LimitsSource, SystemClock};
use logfront_schema::SchemaTimeline;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Frontend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Split interval for tenants without their own
    #[serde(with = "serde_duration")]
    pub default_split_interval: Duration,
    /// Window evaluated by instant queries
    #[serde(with = "serde_duration")]
    pub max_look_back_period: Duration,
    /// Concurrent statistics lookups per request
    pub stats_concurrency: usize,
    /// Fail queries outside the tenant look-back instead of answering empty
    pub reject_out_of_lookback: bool,
}

impl Default for FrontendConfig {
    fn default() -> Self {
        Self {
            default_split_interval: Duration::from_secs(3600),
            max_look_back_period: Duration::from_secs(30),
            stats_concurrency: DEFAULT_STATS_CONCURRENCY,
            reject_out_of_lookback: false,
        }
    }
}

/// Builds the frontend handler chain.
///
/// Order, outermost first: query limits, query size limiter, series
/// limiter, split by interval, querier size limiter. Size limiters are only
/// installed when a statistics handler is configured.
pub struct FrontendBuilder {
    config: FrontendConfig,
    limits: Arc<dyn LimitsSource>,
    timeline: Arc<SchemaTimeline>,
    stats: Option<Arc<dyn StatsHandler>>,
    clock: Arc<dyn Clock>,
}

impl FrontendBuilder {
    pub fn new(
        config: FrontendConfig,
        limits: Arc<dyn LimitsSource>,
        timeline: Arc<SchemaTimeline>,
    ) -> Self {
        Self {
            config,
            limits,
            timeline,
            stats: None,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_stats(mut self, stats: Arc<dyn StatsHandler>) -> Self {
        self.stats = Some(stats);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    pub fn chain(&self) -> MiddlewareChain {
        let size_deps = self.stats.as_ref().map(|stats| SizeLimiterDeps {
            limits: self.limits.clone(),
            timeline: self.timeline.clone(),
            stats: stats.clone(),
            clock: self.clock.clone(),
            engine_look_back: self.config.max_look_back_period,
            stats_concurrency: self.config.stats_concurrency,
        });

        let mut chain = MiddlewareChain::new().with(
            QueryLimits::new(self.limits.clone(), self.clock.clone())
                .reject_out_of_lookback(self.config.reject_out_of_lookback),
        );
        if let Some(deps) = &size_deps {
            chain = chain.with(SizeLimiter::query(deps.clone()));
        }
        chain = chain
            .with(SeriesLimiter::new(self.limits.clone()))
            .with(SplitByInterval::new(
                self.limits.clone(),
                self.timeline.clone(),
                self.config.default_split_interval,
            ));
        if let Some(deps) = size_deps {
            chain = chain.with(SizeLimiter::querier(deps));
        }
        chain
    }

    /// Wrap `downstream` in the full chain
    pub fn build(&self, downstream: Arc<dyn Handler>) -> Arc<dyn Handler> {
        let chain = self.chain();
        info!(middlewares = ?chain.names(), "Frontend chain assembled");
        chain.wrap(downstream)
    }

    pub fn cache_keys(&self) -> CacheKeyGenerator {
        CacheKeyGenerator::new(self.limits.clone(), self.config.default_split_interval)
    }
}

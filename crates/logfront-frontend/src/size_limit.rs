//! Cost-gated size limiters
//!
//! Before a query (or, below the splitter, each sub-query) is executed, the
//! index statistics path is asked how many bytes every stream selector would
//! scan. A selector whose estimate is over the tenant budget rejects the
//! request before any downstream work happens.

use crate::context::Context;
use crate::error::{QueryError, Result, SizeScope};
use crate::executor::execute_stats;
use crate::handler::{Handler, Middleware, StatsHandler};
use crate::matchers::{extract_matcher_groups, MatcherGroup};
use async_trait::async_trait;
use logfront_core::{
    duration_millis, Clock, LimitsSource, Request, Response, TenantLimits, TimeRange,
};
use logfront_schema::SchemaTimeline;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of concurrent statistics lookups per request
pub const DEFAULT_STATS_CONCURRENCY: usize = 10;

/// Shared dependencies of both size limiters
#[derive(Clone)]
pub struct SizeLimiterDeps {
    pub limits: Arc<dyn LimitsSource>,
    pub timeline: Arc<SchemaTimeline>,
    pub stats: Arc<dyn StatsHandler>,
    pub clock: Arc<dyn Clock>,
    /// Window evaluated by an instant query, 0 if not configured
    pub engine_look_back: Duration,
    pub stats_concurrency: usize,
}

/// Size limiter for either the whole query or single sub-queries
pub struct SizeLimiter {
    scope: SizeScope,
    deps: SizeLimiterDeps,
}

impl SizeLimiter {
    /// Limit the unsplit query by `max_query_bytes_read`
    pub fn query(deps: SizeLimiterDeps) -> Self {
        Self {
            scope: SizeScope::Query,
            deps,
        }
    }

    /// Limit each sub-query by `max_querier_bytes_read`
    pub fn querier(deps: SizeLimiterDeps) -> Self {
        Self {
            scope: SizeScope::Querier,
            deps,
        }
    }

    pub fn scope(&self) -> SizeScope {
        self.scope
    }
}

impl Middleware for SizeLimiter {
    fn name(&self) -> &'static str {
        match self.scope {
            SizeScope::Query => "query_size_limiter",
            SizeScope::Querier => "querier_size_limiter",
        }
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(SizeLimitHandler {
            scope: self.scope,
            stage: self.name(),
            deps: self.deps.clone(),
            next,
        })
    }
}

struct SizeLimitHandler {
    scope: SizeScope,
    stage: &'static str,
    deps: SizeLimiterDeps,
    next: Arc<dyn Handler>,
}

impl SizeLimitHandler {
    fn budget(&self, limits: &TenantLimits) -> u64 {
        match self.scope {
            SizeScope::Query => limits.max_query_bytes_read,
            SizeScope::Querier => limits.max_querier_bytes_read,
        }
    }

    /// Time window the query evaluates, before per-selector adjustments
    fn evaluated_window(&self, req: &Request) -> TimeRange {
        let look_back = duration_millis(self.deps.engine_look_back);
        if req.is_instant() && look_back > 0 {
            TimeRange::new(req.end.saturating_sub(look_back), req.end)
        } else {
            req.time_range()
        }
    }

    /// Statistics request for one selector, or `None` when its window is
    /// entirely outside the tenant look-back
    fn stats_request(
        &self,
        req: &Request,
        window: TimeRange,
        group: &MatcherGroup,
        limits: &TenantLimits,
    ) -> Option<Request> {
        let mut start = window
            .start
            .saturating_sub(group.range_ms)
            .saturating_sub(group.offset_ms);
        let end = window.end.saturating_sub(group.offset_ms);

        let look_back = duration_millis(limits.max_query_lookback);
        if look_back > 0 {
            let bound = self.deps.clock.now().saturating_sub(look_back);
            start = start.max(bound);
        }
        if start > end {
            return None;
        }

        let mut stats_req = req.with_range(start, end);
        stats_req.query = group.selector.clone();
        Some(stats_req)
    }
}

#[async_trait]
impl Handler for SizeLimitHandler {
    async fn handle(&self, ctx: &Context, req: Request) -> Result<Response> {
        let limits = self.deps.limits.for_tenant(ctx.tenant());
        let budget = self.budget(&limits);
        if budget == 0 {
            return self.next.handle(ctx, req).await;
        }

        let supports_stats = self
            .deps
            .timeline
            .period_at(req.end)
            .map(|p| p.index_type.supports_index_stats())
            .unwrap_or(false);
        if !supports_stats {
            debug!(
                tenant = %ctx.tenant(),
                scope = %self.scope,
                "Index stats unavailable for period, skipping size check"
            );
            return self.next.handle(ctx, req).await;
        }

        let groups = extract_matcher_groups(&req.query)?;
        let window = self.evaluated_window(&req);
        let (checked, stats_requests): (Vec<&MatcherGroup>, Vec<Request>) = groups
            .iter()
            .filter_map(|g| self.stats_request(&req, window, g, &limits).map(|r| (g, r)))
            .unzip();

        let estimates = execute_stats(
            ctx,
            stats_requests,
            self.deps.stats_concurrency.max(1),
            self.deps.stats.clone(),
        )
        .await
        .map_err(|e| e.in_stage(self.stage))?;

        for (group, stats) in checked.iter().zip(&estimates) {
            if stats.bytes > budget {
                warn!(
                    tenant = %ctx.tenant(),
                    scope = %self.scope,
                    selector = %group.selector,
                    estimated_bytes = stats.bytes,
                    limit_bytes = budget,
                    "Rejecting query over byte budget"
                );
                return Err(QueryError::QueryTooLarge {
                    scope: self.scope,
                    estimated: stats.bytes,
                    limit: budget,
                });
            }
        }

        debug!(
            tenant = %ctx.tenant(),
            scope = %self.scope,
            groups = estimates.len(),
            max_estimated_bytes = estimates.iter().map(|s| s.bytes).max().unwrap_or(0),
            limit_bytes = budget,
            "Query within byte budget"
        );

        self.next.handle(ctx, req).await
    }
}

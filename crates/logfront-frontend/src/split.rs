//! Splitting range queries into aligned sub-queries

use crate::context::Context;
use crate::error::{QueryError, Result};
use crate::executor::execute_requests;
use crate::handler::{Handler, Middleware};
use crate::merge::merge_responses;
use crate::parallelism::weighted_parallelism;
use async_trait::async_trait;
use logfront_core::{duration_millis, LimitsSource, Request, Response, Timestamp};
use logfront_schema::SchemaTimeline;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Split `req` into contiguous pieces whose boundaries fall on multiples
/// of `interval_ms`.
///
/// The first piece starts at `req.start` and the last ends at `req.end`.
/// A non-positive interval or an empty range yields the request unchanged.
pub fn split_by_interval(req: &Request, interval_ms: i64) -> Vec<Request> {
    if interval_ms <= 0 || req.start >= req.end {
        return vec![req.clone()];
    }

    let mut pieces = Vec::new();
    let mut start = req.start;
    while start < req.end {
        let end = next_boundary(start, interval_ms).min(req.end);
        pieces.push(req.with_range(start, end));
        start = end;
    }
    pieces
}

fn next_boundary(ts: Timestamp, interval_ms: i64) -> Timestamp {
    (ts.div_euclid(interval_ms) + 1).saturating_mul(interval_ms)
}

/// Resolve the split interval: the tenant's if set, else `default`
pub fn split_interval(tenant_split: Duration, default: Duration) -> Duration {
    if tenant_split.is_zero() {
        default
    } else {
        tenant_split
    }
}

/// Middleware fanning a range query out over aligned intervals
pub struct SplitByInterval {
    limits: Arc<dyn LimitsSource>,
    timeline: Arc<SchemaTimeline>,
    default_interval: Duration,
}

impl SplitByInterval {
    pub fn new(
        limits: Arc<dyn LimitsSource>,
        timeline: Arc<SchemaTimeline>,
        default_interval: Duration,
    ) -> Self {
        Self {
            limits,
            timeline,
            default_interval,
        }
    }
}

impl Middleware for SplitByInterval {
    fn name(&self) -> &'static str {
        "split_by_interval"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(SplitHandler {
            limits: self.limits.clone(),
            timeline: self.timeline.clone(),
            default_interval: self.default_interval,
            next,
        })
    }
}

struct SplitHandler {
    limits: Arc<dyn LimitsSource>,
    timeline: Arc<SchemaTimeline>,
    default_interval: Duration,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for SplitHandler {
    async fn handle(&self, ctx: &Context, req: Request) -> Result<Response> {
        let limits = self.limits.for_tenant(ctx.tenant());

        let parallelism = weighted_parallelism(&self.timeline, &limits, req.start, req.end);
        if parallelism == 0 {
            return Err(QueryError::ParallelismDisabled {
                tenant: ctx.tenant().to_string(),
            });
        }

        let interval = split_interval(limits.split_queries_by_interval, self.default_interval);
        let mut pieces = split_by_interval(&req, duration_millis(interval));

        if pieces.len() == 1 {
            let piece = pieces.remove(0);
            return self
                .next
                .handle(ctx, piece)
                .await
                .map_err(|e| e.in_stage("split_by_interval"));
        }

        debug!(
            tenant = %ctx.tenant(),
            pieces = pieces.len(),
            parallelism,
            interval_ms = duration_millis(interval),
            "Splitting query"
        );

        let responses = execute_requests(ctx, pieces, parallelism, self.next.clone())
            .await
            .map_err(|e| e.in_stage("split_by_interval"))?;
        merge_responses(&req, responses)
    }
}

//! Series cardinality limiting

use crate::context::Context;
use crate::error::{QueryError, Result};
use crate::handler::{Handler, Middleware};
use async_trait::async_trait;
use fxhash::FxHasher;
use logfront_core::{Labels, LimitsSource, Request, Response};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::warn;

/// Fingerprint of a label set
pub fn series_fingerprint(labels: &Labels) -> u64 {
    let mut hasher = FxHasher::default();
    for (name, value) in labels {
        name.hash(&mut hasher);
        value.hash(&mut hasher);
    }
    hasher.finish()
}

/// Running set of distinct series seen by one query
pub struct SeriesTracker {
    limit: usize,
    seen: Mutex<HashSet<u64>>,
}

impl SeriesTracker {
    /// Track up to `limit` distinct series (0 = unlimited)
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// Record the series of `resp`, failing once the limit is exceeded
    pub fn observe(&self, resp: &Response) -> Result<()> {
        if self.limit == 0 {
            return Ok(());
        }
        let mut seen = self.seen.lock();
        for labels in resp.data.label_sets() {
            seen.insert(series_fingerprint(labels));
        }
        if seen.len() > self.limit {
            return Err(QueryError::SeriesLimitExceeded { limit: self.limit });
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// Middleware failing a query whose result has too many distinct series
pub struct SeriesLimiter {
    limits: Arc<dyn LimitsSource>,
}

impl SeriesLimiter {
    pub fn new(limits: Arc<dyn LimitsSource>) -> Self {
        Self { limits }
    }
}

impl Middleware for SeriesLimiter {
    fn name(&self) -> &'static str {
        "series_limiter"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(SeriesLimitHandler {
            limits: self.limits.clone(),
            next,
        })
    }
}

struct SeriesLimitHandler {
    limits: Arc<dyn LimitsSource>,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for SeriesLimitHandler {
    async fn handle(&self, ctx: &Context, req: Request) -> Result<Response> {
        let max_series = self.limits.for_tenant(ctx.tenant()).max_query_series;
        if max_series == 0 {
            return self.next.handle(ctx, req).await;
        }

        // Sub-queries dispatched below record into the tracker as they
        // complete, so a violation stops the fan-out early.
        let tracker = Arc::new(SeriesTracker::new(max_series));
        let child = ctx.with_series_tracker(tracker.clone());

        let result: Result<Response> = async {
            let resp = self.next.handle(&child, req).await?;
            tracker.observe(&resp)?;
            Ok(resp)
        }
        .await;

        if let Err(QueryError::SeriesLimitExceeded { limit }) = &result {
            warn!(
                tenant = %ctx.tenant(),
                limit,
                seen = tracker.count(),
                "Query exceeded series limit"
            );
        }
        result
    }
}

//! Query length and look-back limits

use crate::context::Context;
use crate::error::{QueryError, Result};
use crate::handler::{Handler, Middleware};
use async_trait::async_trait;
use logfront_core::{duration_millis, Clock, LimitsSource, Request, Response};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Middleware enforcing `max_query_lookback` and `max_query_length`
pub struct QueryLimits {
    limits: Arc<dyn LimitsSource>,
    clock: Arc<dyn Clock>,
    reject_out_of_lookback: bool,
}

impl QueryLimits {
    pub fn new(limits: Arc<dyn LimitsSource>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limits,
            clock,
            reject_out_of_lookback: false,
        }
    }

    /// Fail queries entirely outside the look-back instead of answering empty
    pub fn reject_out_of_lookback(mut self, reject: bool) -> Self {
        self.reject_out_of_lookback = reject;
        self
    }
}

impl Middleware for QueryLimits {
    fn name(&self) -> &'static str {
        "query_limits"
    }

    fn wrap(&self, next: Arc<dyn Handler>) -> Arc<dyn Handler> {
        Arc::new(QueryLimitsHandler {
            limits: self.limits.clone(),
            clock: self.clock.clone(),
            reject_out_of_lookback: self.reject_out_of_lookback,
            next,
        })
    }
}

struct QueryLimitsHandler {
    limits: Arc<dyn LimitsSource>,
    clock: Arc<dyn Clock>,
    reject_out_of_lookback: bool,
    next: Arc<dyn Handler>,
}

#[async_trait]
impl Handler for QueryLimitsHandler {
    async fn handle(&self, ctx: &Context, mut req: Request) -> Result<Response> {
        let limits = self.limits.for_tenant(ctx.tenant());

        let look_back = duration_millis(limits.max_query_lookback);
        if look_back > 0 {
            let bound = self.clock.now().saturating_sub(look_back);
            if req.end < bound {
                if self.reject_out_of_lookback {
                    return Err(QueryError::ExceedsLookback { end: req.end, bound });
                }
                debug!(
                    tenant = %ctx.tenant(),
                    end = req.end,
                    bound,
                    "Query entirely outside look-back, returning empty result"
                );
                return Ok(Response::empty_for(&req));
            }
            if req.start < bound {
                debug!(
                    tenant = %ctx.tenant(),
                    start = req.start,
                    bound,
                    "Clipping query start to look-back"
                );
                req = req.with_range(bound, req.end);
            }
        }

        let max_length = duration_millis(limits.max_query_length);
        if max_length > 0 && req.duration_millis() > max_length {
            return Err(QueryError::QueryTooLong {
                length: Duration::from_millis(req.duration_millis().max(0) as u64),
                limit: limits.max_query_length,
            });
        }

        self.next.handle(ctx, req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::handler_fn;
    use logfront_core::{FixedClock, StaticLimits, TenantLimits};
    use parking_lot::Mutex;

    const HOUR: i64 = 3_600_000;
    const NOW: i64 = 500 * HOUR;

    fn limits(look_back_hours: u64, max_length_hours: u64) -> Arc<dyn LimitsSource> {
        Arc::new(StaticLimits::new(TenantLimits {
            max_query_lookback: Duration::from_secs(look_back_hours * 3600),
            max_query_length: Duration::from_secs(max_length_hours * 3600),
            ..TenantLimits::default()
        }))
    }

    fn recording() -> (Arc<dyn Handler>, Arc<Mutex<Vec<Request>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let handler = handler_fn(move |_ctx, req| {
            let s = s.clone();
            async move {
                s.lock().push(req.clone());
                Ok(Response::empty_for(&req))
            }
        });
        (handler, seen)
    }

    fn request(start: i64, end: i64) -> Request {
        Request::builder(r#"{app="foo"}"#).time_range(start, end).build().unwrap()
    }

    #[tokio::test]
    async fn test_outside_look_back_returns_empty() {
        let (next, seen) = recording();
        let handler = QueryLimits::new(limits(1, 0), Arc::new(FixedClock(NOW))).wrap(next);

        let resp = handler
            .handle(&Context::new("t"), request(NOW - 6 * HOUR, NOW - 2 * HOUR))
            .await
            .unwrap();
        assert_eq!(resp, Response::empty_for(&request(0, 1)));
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_outside_look_back_rejected_when_configured() {
        let (next, _) = recording();
        let handler = QueryLimits::new(limits(1, 0), Arc::new(FixedClock(NOW)))
            .reject_out_of_lookback(true)
            .wrap(next);
        let err = handler
            .handle(&Context::new("t"), request(NOW - 6 * HOUR, NOW - 2 * HOUR))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::ExceedsLookback { bound, .. } if bound == NOW - HOUR));
        assert!(err.is_admission_rejection());
    }

    #[tokio::test]
    async fn test_start_clipped_to_look_back() {
        let (next, seen) = recording();
        let handler = QueryLimits::new(limits(2, 0), Arc::new(FixedClock(NOW))).wrap(next);
        handler
            .handle(&Context::new("t"), request(NOW - 6 * HOUR, NOW))
            .await
            .unwrap();
        let seen = seen.lock();
        assert_eq!((seen[0].start, seen[0].end), (NOW - 2 * HOUR, NOW));
    }

    #[tokio::test]
    async fn test_query_too_long() {
        let (next, seen) = recording();
        let handler = QueryLimits::new(limits(0, 24), Arc::new(FixedClock(NOW))).wrap(next);

        let err = handler
            .handle(&Context::new("t"), request(NOW - 25 * HOUR, NOW))
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::QueryTooLong { .. }));
        assert!(seen.lock().is_empty());

        handler
            .handle(&Context::new("t"), request(NOW - 24 * HOUR, NOW))
            .await
            .unwrap();
        assert_eq!(seen.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_unlimited_passes_through() {
        let (next, seen) = recording();
        let handler = QueryLimits::new(limits(0, 0), Arc::new(FixedClock(NOW))).wrap(next);
        handler
            .handle(&Context::new("t"), request(0, NOW))
            .await
            .unwrap();
        assert_eq!(seen.lock()[0].start, 0);
    }
}

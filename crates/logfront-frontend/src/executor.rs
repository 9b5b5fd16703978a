//! Bounded concurrent execution of sub-requests
//!
//! At most `parallelism` sub-requests are in flight at once. The first
//! failure stops further dispatch; outstanding work is drained and its
//! results discarded. Results come back in input order.

use crate::context::Context;
use crate::error::{QueryError, Result};
use crate::handler::{Handler, StatsHandler};
use logfront_core::{IndexStats, Request, Response};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

/// Run `call` for every request with at most `parallelism` in flight.
///
/// `observe` sees each successful result as it completes; an error from it
/// is treated like a sub-request failure.
pub async fn execute_with<T, F, Fut, O>(
    ctx: &Context,
    requests: Vec<Request>,
    parallelism: usize,
    call: F,
    mut observe: O,
) -> Result<Vec<T>>
where
    T: Send + 'static,
    F: Fn(Context, Request) -> Fut,
    Fut: Future<Output = Result<T>> + Send + 'static,
    O: FnMut(&T) -> Result<()>,
{
    if parallelism == 0 {
        return Err(QueryError::ParallelismDisabled {
            tenant: ctx.tenant().to_string(),
        });
    }
    ctx.check()?;

    let total = requests.len();
    let mut results: Vec<Option<T>> = (0..total).map(|_| None).collect();
    let mut pending = requests.into_iter().enumerate();
    let mut in_flight = JoinSet::new();
    let mut first_error: Option<QueryError> = None;
    let mut dispatched = 0usize;

    loop {
        while first_error.is_none() && in_flight.len() < parallelism {
            let Some((index, req)) = pending.next() else {
                break;
            };
            let fut = call(ctx.child(), req);
            in_flight.spawn(async move { (index, fut.await) });
            dispatched += 1;
        }

        if in_flight.is_empty() {
            break;
        }

        let joined = tokio::select! {
            biased;
            err = ctx.done() => {
                in_flight.shutdown().await;
                debug!(
                    tenant = %ctx.tenant(),
                    dispatched,
                    total,
                    "Sub-request execution interrupted"
                );
                return Err(err);
            }
            joined = in_flight.join_next() => joined,
        };

        // Once an error is recorded, remaining completions are only drained.
        match joined {
            Some(Ok((index, Ok(value)))) => {
                if first_error.is_none() {
                    match observe(&value) {
                        Ok(()) => results[index] = Some(value),
                        Err(err) => first_error = Some(err),
                    }
                }
            }
            Some(Ok((_, Err(err)))) => {
                if first_error.is_none() {
                    first_error = Some(err);
                }
            }
            Some(Err(join_err)) => {
                if first_error.is_none() {
                    first_error = Some(QueryError::Internal(format!(
                        "sub-request task failed: {}",
                        join_err
                    )));
                }
            }
            None => break,
        }
    }

    if let Some(err) = first_error {
        debug!(
            tenant = %ctx.tenant(),
            dispatched,
            total,
            error = %err,
            "Sub-request execution failed"
        );
        return Err(err);
    }

    debug!(tenant = %ctx.tenant(), total, parallelism, "Sub-requests completed");

    results
        .into_iter()
        .map(|r| r.ok_or_else(|| QueryError::Internal("missing sub-request result".to_string())))
        .collect()
}

/// Run query sub-requests against `next`.
///
/// When the context carries a series tracker every response is recorded
/// in it as soon as it arrives.
pub async fn execute_requests(
    ctx: &Context,
    requests: Vec<Request>,
    parallelism: usize,
    next: Arc<dyn Handler>,
) -> Result<Vec<Response>> {
    let tracker = ctx.series_tracker().cloned();
    execute_with(
        ctx,
        requests,
        parallelism,
        |child, req| {
            let next = next.clone();
            async move { next.handle(&child, req).await }
        },
        |resp: &Response| match &tracker {
            Some(tracker) => tracker.observe(resp),
            None => Ok(()),
        },
    )
    .await
}

/// Fetch index statistics for each request
pub async fn execute_stats(
    ctx: &Context,
    requests: Vec<Request>,
    parallelism: usize,
    stats: Arc<dyn StatsHandler>,
) -> Result<Vec<IndexStats>> {
    execute_with(
        ctx,
        requests,
        parallelism,
        |child, req| {
            let stats = stats.clone();
            async move { stats.estimate(&child, req).await }
        },
        |_| Ok(()),
    )
    .await
}

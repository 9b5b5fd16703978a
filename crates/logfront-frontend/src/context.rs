//! Per-query execution context
//!
//! A [`Context`] carries the tenant identity, a cancellation token and an
//! optional deadline through the middleware chain. Sub-requests receive a
//! child context so that cancelling the parent stops every descendant.

use crate::error::{QueryError, Result};
use crate::series_limit::SeriesTracker;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Execution context for a single query
#[derive(Clone)]
pub struct Context {
    tenant: Arc<str>,
    cancel: CancellationToken,
    deadline: Option<Instant>,
    series: Option<Arc<SeriesTracker>>,
}

impl Context {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self::with_cancellation(tenant, CancellationToken::new())
    }

    /// Create a context driven by an existing cancellation token
    pub fn with_cancellation(tenant: impl Into<String>, cancel: CancellationToken) -> Self {
        let tenant: String = tenant.into();
        Self {
            tenant: Arc::from(tenant),
            cancel,
            deadline: None,
            series: None,
        }
    }

    /// Set a deadline, keeping the earlier one if already set
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Cancel this context and all of its children
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Derive a context whose cancellation follows this one
    pub fn child(&self) -> Self {
        Self {
            tenant: self.tenant.clone(),
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
            series: self.series.clone(),
        }
    }

    /// Derive a child context that records distinct series into `tracker`
    pub fn with_series_tracker(&self, tracker: Arc<SeriesTracker>) -> Self {
        let mut child = self.child();
        child.series = Some(tracker);
        child
    }

    pub fn series_tracker(&self) -> Option<&Arc<SeriesTracker>> {
        self.series.as_ref()
    }

    /// The error this context has terminated with, if any
    pub fn err(&self) -> Option<QueryError> {
        if self.cancel.is_cancelled() {
            return Some(QueryError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(QueryError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn check(&self) -> Result<()> {
        match self.err() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> QueryError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => QueryError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => QueryError::DeadlineExceeded,
            },
            None => {
                self.cancel.cancelled().await;
                QueryError::Cancelled
            }
        }
    }

    /// Run `fut` to completion unless the context terminates first
    pub async fn run<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            res = fut => res,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("tenant", &self.tenant)
            .field("cancelled", &self.cancel.is_cancelled())
            .field("deadline", &self.deadline)
            .field("series_tracking", &self.series.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_follows_parent_cancellation() {
        let parent = Context::new("tenant-a");
        let child = parent.child();
        assert_eq!(child.tenant(), "tenant-a");
        assert!(child.check().is_ok());

        parent.cancel();
        assert!(matches!(child.check(), Err(QueryError::Cancelled)));
    }

    #[test]
    fn test_child_cancel_does_not_affect_parent() {
        let parent = Context::new("t");
        let child = parent.child();
        child.cancel();
        assert!(parent.check().is_ok());
    }

    #[tokio::test]
    async fn test_deadline_expires() {
        let ctx = Context::new("t").with_timeout(Duration::from_millis(10));
        let err = ctx.done().await;
        assert!(matches!(err, QueryError::DeadlineExceeded));
        assert!(matches!(ctx.check(), Err(QueryError::DeadlineExceeded)));
    }

    #[test]
    fn test_earlier_deadline_wins() {
        let now = Instant::now();
        let ctx = Context::new("t")
            .with_deadline(now + Duration::from_secs(5))
            .with_deadline(now + Duration::from_secs(60));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_run_returns_cancellation() {
        let ctx = Context::new("t");
        ctx.cancel();
        let res: Result<()> = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(())
            })
            .await;
        assert!(matches!(res, Err(QueryError::Cancelled)));
    }
}

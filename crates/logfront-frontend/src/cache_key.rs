//! Results cache keys

use crate::split::split_interval;
use logfront_core::{duration_millis, LimitsSource, Request};
use std::sync::Arc;
use std::time::Duration;

/// Builds `tenant:query:step:interval_index:interval_width_ms` keys.
///
/// Requests that fall into the same split interval share a key so their
/// results can be reused.
pub struct CacheKeyGenerator {
    limits: Arc<dyn LimitsSource>,
    default_split: Duration,
}

impl CacheKeyGenerator {
    pub fn new(limits: Arc<dyn LimitsSource>, default_split: Duration) -> Self {
        Self {
            limits,
            default_split,
        }
    }

    pub fn key(&self, tenant: &str, req: &Request) -> String {
        let tenant_split = self.limits.for_tenant(tenant).split_queries_by_interval;
        let width = duration_millis(split_interval(tenant_split, self.default_split));
        cache_key(tenant, req, width)
    }
}

/// Cache key for `req` with an explicit interval width
pub fn cache_key(tenant: &str, req: &Request, interval_ms: i64) -> String {
    let (index, width) = if interval_ms > 0 {
        (req.start.div_euclid(interval_ms), interval_ms)
    } else {
        (0, 0)
    };
    format!(
        "{}:{}:{}:{}:{}",
        tenant,
        normalize_query(&req.query),
        req.step,
        index,
        width
    )
}

/// Collapse whitespace runs outside string literals to a single space
pub fn normalize_query(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;
    let mut pending_space = false;

    for c in query.trim().chars() {
        if let Some(q) = quote {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' && q == '"' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        if c.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push(' ');
            pending_space = false;
        }
        if c == '"' || c == '`' {
            quote = Some(c);
        }
        out.push(c);
    }
    out
}

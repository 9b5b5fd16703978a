//! Parallelism weighted by index type
//!
//! A query spanning both TSDB and non-TSDB periods gets a parallelism
//! blended from the two tenant limits in proportion to the time it spends
//! in each kind of period.

use logfront_core::{TenantLimits, Timestamp};
use logfront_schema::SchemaTimeline;
use tracing::{debug, warn};

/// Compute the parallelism for a query over `[start, end)`.
///
/// Returns 0 only when both parallelism limits are 0, meaning querying is
/// disabled for the tenant. Any other outcome is at least 1.
pub fn weighted_parallelism(
    timeline: &SchemaTimeline,
    limits: &TenantLimits,
    start: Timestamp,
    end: Timestamp,
) -> usize {
    let tsdb_max = limits.tsdb_max_query_parallelism;
    let regular_max = limits.max_query_parallelism;

    if tsdb_max == 0 && regular_max == 0 {
        return 0;
    }

    if end < start {
        warn!(start, end, "Query end precedes start, using parallelism of 1");
        return 1;
    }

    let overlaps = timeline.applicable_periods(start, end);

    if start == end {
        let limit = match overlaps.first() {
            Some(o) if o.period.index_type.is_tsdb() => tsdb_max,
            _ => regular_max,
        };
        return limit.max(1);
    }

    let (mut tsdb_ms, mut regular_ms) = (0i64, 0i64);
    for overlap in &overlaps {
        if overlap.period.index_type.is_tsdb() {
            tsdb_ms += overlap.duration_millis();
        } else {
            regular_ms += overlap.duration_millis();
        }
    }

    let total = tsdb_ms + regular_ms;
    if total == 0 {
        warn!(start, end, "Query does not overlap any schema period, using parallelism of 1");
        return 1;
    }

    // Each class is truncated on its own before summing.
    let tsdb_part = share(tsdb_ms, total, tsdb_max);
    let regular_part = share(regular_ms, total, regular_max);
    let parallelism = tsdb_part + regular_part;

    debug!(
        start,
        end,
        tsdb_ms,
        regular_ms,
        tsdb_part,
        regular_part,
        "Computed weighted parallelism"
    );

    parallelism.max(1)
}

fn share(part: i64, total: i64, limit: usize) -> usize {
    (part as i128 * limit as i128 / total as i128) as usize
}

use logfront_core::{
    FixedClock, IndexStats, Labels, LimitsOverride, LimitsSource, Request, Response,
    ResultData, Sample, Series, StaticLimits, TenantLimits,
};
use logfront_frontend::{
    handler_fn, stats_fn, Context, FrontendBuilder, FrontendConfig, Handler, MiddlewareChain,
    QueryError, SeriesLimiter, SizeLimiter, SizeLimiterDeps, SizeScope, SplitByInterval,
    StatsHandler,
};
use logfront_schema::{IndexType, PeriodConfig, SchemaTimeline};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const HOUR: i64 = 3_600_000;
const NOW: i64 = 10_000 * HOUR;

fn tsdb_timeline() -> Arc<SchemaTimeline> {
    Arc::new(SchemaTimeline::new(vec![PeriodConfig::new(0, IndexType::Tsdb)]).unwrap())
}

fn boltdb_timeline() -> Arc<SchemaTimeline> {
    Arc::new(SchemaTimeline::new(vec![PeriodConfig::new(0, IndexType::BoltdbShipper)]).unwrap())
}

fn limits(f: impl FnOnce(&mut TenantLimits)) -> Arc<dyn LimitsSource> {
    let mut l = TenantLimits::default();
    f(&mut l);
    Arc::new(StaticLimits::new(l))
}

fn labels(app: &str) -> Labels {
    let mut l = Labels::new();
    l.insert("app".to_string(), app.to_string());
    l
}

fn metric_request(start: i64, end: i64) -> Request {
    Request::builder(r#"sum(rate({app="foo"}[1m]))"#)
        .time_range(start, end)
        .step(60_000)
        .build()
        .unwrap()
}

/// Downstream answering one sample at the start of each sub-query
fn sample_handler(calls: Arc<AtomicUsize>) -> Arc<dyn Handler> {
    handler_fn(move |_ctx, req| {
        calls.fetch_add(1, Ordering::SeqCst);
        async move {
            Ok(Response::matrix(vec![Series {
                labels: labels("foo"),
                samples: vec![Sample {
                    timestamp: req.start,
                    value: 1.0,
                }],
            }]))
        }
    })
}

fn counting_stats(hits: Arc<AtomicUsize>, bytes: u64) -> Arc<dyn StatsHandler> {
    stats_fn(move |_ctx, _req| {
        hits.fetch_add(1, Ordering::SeqCst);
        async move { Ok(IndexStats::with_bytes(bytes)) }
    })
}

#[tokio::test]
async fn test_max_in_flight_respects_parallelism() {
    let l = limits(|l| {
        l.split_queries_by_interval = Duration::from_secs(3600);
        l.max_query_parallelism = 2;
        l.tsdb_max_query_parallelism = 2;
    });
    let split = SplitByInterval::new(l, tsdb_timeline(), Duration::from_secs(3600));

    let in_flight = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let calls = Arc::new(AtomicUsize::new(0));
    let (f, m, c) = (in_flight.clone(), max_seen.clone(), calls.clone());
    let downstream = handler_fn(move |_ctx, req| {
        let (f, m, c) = (f.clone(), m.clone(), c.clone());
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            let now = f.fetch_add(1, Ordering::SeqCst) + 1;
            m.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            f.fetch_sub(1, Ordering::SeqCst);
            Ok(Response::empty_for(&req))
        }
    });

    let handler = MiddlewareChain::new().with(split).wrap(downstream);
    let resp = handler
        .handle(&Context::new("t"), metric_request(NOW - 10 * HOUR, NOW))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 10);
    assert!(max_seen.load(Ordering::SeqCst) <= 2);
    assert!(max_seen.load(Ordering::SeqCst) >= 1);
    assert_eq!(resp.stats.sub_queries, 10);
}

#[tokio::test]
async fn test_disabled_tenant_is_rejected() {
    let source = StaticLimits::new(TenantLimits {
        split_queries_by_interval: Duration::from_secs(3600),
        ..TenantLimits::default()
    })
    .with_override(
        "disabled",
        LimitsOverride {
            max_query_parallelism: Some(0),
            tsdb_max_query_parallelism: Some(0),
            ..Default::default()
        },
    );
    let builder = FrontendBuilder::new(
        FrontendConfig::default(),
        Arc::new(source),
        tsdb_timeline(),
    )
    .with_clock(Arc::new(FixedClock(NOW)));
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = builder.build(sample_handler(calls.clone()));

    let err = handler
        .handle(&Context::new("disabled"), metric_request(NOW - HOUR, NOW))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::ParallelismDisabled { ref tenant } if tenant == "disabled"));
    assert!(err.is_client_error());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    handler
        .handle(&Context::new("enabled"), metric_request(NOW - HOUR, NOW))
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_split_results_are_merged_in_order() {
    let builder = FrontendBuilder::new(
        FrontendConfig::default(),
        limits(|l| l.split_queries_by_interval = Duration::from_secs(3600)),
        tsdb_timeline(),
    )
    .with_clock(Arc::new(FixedClock(NOW)));
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = builder.build(sample_handler(calls.clone()));

    let start = NOW - 3 * HOUR - HOUR / 2;
    let resp = handler
        .handle(&Context::new("t"), metric_request(start, NOW))
        .await
        .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    let ResultData::Matrix(series) = resp.data else {
        panic!("expected a matrix");
    };
    assert_eq!(series.len(), 1);
    let ts: Vec<i64> = series[0].samples.iter().map(|s| s.timestamp).collect();
    assert_eq!(ts, vec![start, NOW - 3 * HOUR, NOW - 2 * HOUR, NOW - HOUR]);
}

#[tokio::test]
async fn test_series_limit_stops_fan_out() {
    let l = limits(|l| {
        l.split_queries_by_interval = Duration::from_secs(3600);
        l.max_query_parallelism = 2;
        l.tsdb_max_query_parallelism = 2;
        l.max_query_series = 1;
    });
    let chain = MiddlewareChain::new()
        .with(SeriesLimiter::new(l.clone()))
        .with(SplitByInterval::new(l, tsdb_timeline(), Duration::from_secs(3600)));

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    let downstream = handler_fn(move |_ctx, _req| {
        let c = c.clone();
        async move {
            let app = if c.fetch_add(1, Ordering::SeqCst) == 0 { "a" } else { "b" };
            Ok(Response::matrix(vec![Series {
                labels: labels(app),
                samples: vec![],
            }]))
        }
    });
    let handler = chain.wrap(downstream);

    // Unaligned 6h range splits into 7 pieces
    let start = NOW - 6 * HOUR + 17;
    let err = handler
        .handle(&Context::new("t"), metric_request(start, start + 6 * HOUR))
        .await
        .unwrap_err();

    assert!(matches!(err, QueryError::SeriesLimitExceeded { limit: 1 }));
    assert!(calls.load(Ordering::SeqCst) <= 4, "calls: {}", calls.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_series_limit_checked_on_unsplit_response() {
    let l = limits(|l| {
        l.split_queries_by_interval = Duration::ZERO;
        l.max_query_series = 1;
    });
    let chain = MiddlewareChain::new()
        .with(SeriesLimiter::new(l.clone()))
        .with(SplitByInterval::new(l, tsdb_timeline(), Duration::ZERO));
    let handler = chain.wrap(handler_fn(|_ctx, _req| async {
        Ok(Response::matrix(vec![
            Series {
                labels: labels("a"),
                samples: vec![],
            },
            Series {
                labels: labels("b"),
                samples: vec![],
            },
        ]))
    }));

    let err = handler
        .handle(&Context::new("t"), metric_request(NOW - HOUR, NOW))
        .await
        .unwrap_err();
    assert!(err.is_admission_rejection());
}

struct SizeCase {
    timeline: Arc<SchemaTimeline>,
    query: &'static str,
    query_budget: u64,
    querier_budget: u64,
    query_bytes: u64,
    querier_bytes: u64,
}

struct SizeOutcome {
    result: Result<Response, QueryError>,
    query_hits: usize,
    querier_hits: usize,
    downstream_calls: usize,
}

async fn run_size_case(case: SizeCase) -> SizeOutcome {
    let l = limits(|l| {
        l.split_queries_by_interval = Duration::ZERO;
        l.max_query_bytes_read = case.query_budget;
        l.max_querier_bytes_read = case.querier_budget;
    });
    let query_hits = Arc::new(AtomicUsize::new(0));
    let querier_hits = Arc::new(AtomicUsize::new(0));
    let deps = |stats| SizeLimiterDeps {
        limits: l.clone(),
        timeline: case.timeline.clone(),
        stats,
        clock: Arc::new(FixedClock(NOW)),
        engine_look_back: Duration::from_secs(30),
        stats_concurrency: 10,
    };

    let chain = MiddlewareChain::new()
        .with(SizeLimiter::query(deps(counting_stats(query_hits.clone(), case.query_bytes))))
        .with(SplitByInterval::new(l.clone(), case.timeline.clone(), Duration::ZERO))
        .with(SizeLimiter::querier(deps(counting_stats(
            querier_hits.clone(),
            case.querier_bytes,
        ))));

    let calls = Arc::new(AtomicUsize::new(0));
    let handler = chain.wrap(sample_handler(calls.clone()));
    let req = Request::builder(case.query)
        .time_range(NOW - HOUR, NOW)
        .step(60_000)
        .build()
        .unwrap();
    let result = handler.handle(&Context::new("t"), req).await;

    SizeOutcome {
        result,
        query_hits: query_hits.load(Ordering::SeqCst),
        querier_hits: querier_hits.load(Ordering::SeqCst),
        downstream_calls: calls.load(Ordering::SeqCst),
    }
}

const LOG_QUERY: &str = r#"{app="foo"} |= "foo""#;
const MULTI_QUERY: &str = r#"sum_over_time({app="foo"} |= "foo" | unwrap foo [1h]) / sum_over_time({app="bar"} |= "bar" | unwrap bar [1h] offset 1h)"#;

#[tokio::test]
async fn test_size_limit_skipped_without_index_stats() {
    let out = run_size_case(SizeCase {
        timeline: boltdb_timeline(),
        query: LOG_QUERY,
        query_budget: 1000,
        querier_budget: 100,
        query_bytes: 5000,
        querier_bytes: 5000,
    })
    .await;
    assert!(out.result.is_ok());
    assert_eq!((out.query_hits, out.querier_hits), (0, 0));
    assert_eq!(out.downstream_calls, 1);
}

#[tokio::test]
async fn test_size_limit_unlimited_issues_no_lookups() {
    let out = run_size_case(SizeCase {
        timeline: tsdb_timeline(),
        query: LOG_QUERY,
        query_budget: 0,
        querier_budget: 0,
        query_bytes: 5000,
        querier_bytes: 5000,
    })
    .await;
    assert!(out.result.is_ok());
    assert_eq!((out.query_hits, out.querier_hits), (0, 0));
}

#[tokio::test]
async fn test_size_limit_within_budgets() {
    let out = run_size_case(SizeCase {
        timeline: tsdb_timeline(),
        query: LOG_QUERY,
        query_budget: 1000,
        querier_budget: 100,
        query_bytes: 900,
        querier_bytes: 90,
    })
    .await;
    assert!(out.result.is_ok());
    assert_eq!((out.query_hits, out.querier_hits), (1, 1));
    assert_eq!(out.downstream_calls, 1);
}

#[tokio::test]
async fn test_query_too_large_skips_querier_check() {
    let out = run_size_case(SizeCase {
        timeline: tsdb_timeline(),
        query: LOG_QUERY,
        query_budget: 1000,
        querier_budget: 100,
        query_bytes: 1001,
        querier_bytes: 10,
    })
    .await;
    let err = out.result.unwrap_err();
    assert!(matches!(err, QueryError::QueryTooLarge { scope: SizeScope::Query, .. }));
    assert_eq!((out.query_hits, out.querier_hits), (1, 0));
    assert_eq!(out.downstream_calls, 0);
}

#[tokio::test]
async fn test_querier_too_large() {
    let out = run_size_case(SizeCase {
        timeline: tsdb_timeline(),
        query: LOG_QUERY,
        query_budget: 1000,
        querier_budget: 100,
        query_bytes: 500,
        querier_bytes: 101,
    })
    .await;
    let err = out.result.unwrap_err();
    assert!(matches!(err, QueryError::QueryTooLarge { scope: SizeScope::Querier, .. }));
    assert_eq!((out.query_hits, out.querier_hits), (1, 1));
    assert_eq!(out.downstream_calls, 0);
}

#[tokio::test]
async fn test_multiple_matcher_groups_are_estimated_separately() {
    let out = run_size_case(SizeCase {
        timeline: tsdb_timeline(),
        query: MULTI_QUERY,
        query_budget: 1000,
        querier_budget: 1000,
        query_bytes: 600,
        querier_bytes: 600,
    })
    .await;
    // 600 per group stays within budget even though the sum would not
    assert!(out.result.is_ok());
    assert_eq!((out.query_hits, out.querier_hits), (2, 2));
}

#[tokio::test]
async fn test_query_outside_look_back_returns_empty() {
    let builder = FrontendBuilder::new(
        FrontendConfig::default(),
        limits(|l| l.max_query_lookback = Duration::from_secs(3600)),
        tsdb_timeline(),
    )
    .with_clock(Arc::new(FixedClock(NOW)));
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = builder.build(sample_handler(calls.clone()));

    let resp = handler
        .handle(&Context::new("t"), metric_request(NOW - 6 * HOUR, NOW - 2 * HOUR))
        .await
        .unwrap();
    assert_eq!(resp.data, ResultData::Matrix(vec![]));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_downstream_error_is_attributed_to_stage() {
    let builder = FrontendBuilder::new(
        FrontendConfig::default(),
        limits(|l| l.split_queries_by_interval = Duration::from_secs(3600)),
        tsdb_timeline(),
    )
    .with_clock(Arc::new(FixedClock(NOW)));
    let handler = builder.build(handler_fn(|_ctx, req| async move {
        if req.start % HOUR == 0 {
            Err(QueryError::Backend("querier unavailable".to_string()))
        } else {
            Ok(Response::empty_for(&req))
        }
    }));

    let err = handler
        .handle(&Context::new("t"), metric_request(NOW - 3 * HOUR, NOW))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Stage { stage: "split_by_interval", .. }));
    assert!(matches!(err.root(), QueryError::Backend(_)));
    assert!(!err.is_admission_rejection());
}

#[tokio::test]
async fn test_cancellation_propagates_through_chain() {
    let builder = FrontendBuilder::new(
        FrontendConfig::default(),
        limits(|l| l.split_queries_by_interval = Duration::from_secs(3600)),
        tsdb_timeline(),
    )
    .with_clock(Arc::new(FixedClock(NOW)));
    let handler = builder.build(handler_fn(|ctx: Context, req| async move {
        ctx.run(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Response::empty_for(&req))
        })
        .await
    }));

    let ctx = Context::new("t");
    let canceller = ctx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let err = handler
        .handle(&ctx, metric_request(NOW - 4 * HOUR, NOW))
        .await
        .unwrap_err();
    assert!(matches!(err, QueryError::Cancelled));
    assert!(err.is_cancellation());
}

#[test]
fn test_cache_key_from_builder() {
    let builder = FrontendBuilder::new(
        FrontendConfig {
            default_split_interval: Duration::ZERO,
            ..FrontendConfig::default()
        },
        limits(|l| l.split_queries_by_interval = Duration::ZERO),
        tsdb_timeline(),
    );
    let req = metric_request(NOW - HOUR, NOW);
    assert_eq!(
        builder.cache_keys().key("foo", &req),
        r#"foo:sum(rate({app="foo"}[1m])):60000:0:0"#
    );
}

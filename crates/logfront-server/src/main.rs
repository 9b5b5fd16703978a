//! logfront - query frontend planning tool
//!
//! Usage:
//!   logfront [--config <PATH>] <COMMAND>
//!
//! Commands:
//!   plan             Show how a query would be split, scheduled and cached
//!   check-config     Validate a configuration file
//!   default-config   Write the default configuration

mod config;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::DateTime;
use clap::{Parser, Subcommand};
use config::{LogfrontConfig, LoggingSettings, DEFAULT_CONFIG_FILE};
use logfront_core::{
    duration_millis, format_duration, parse_duration, Clock, Direction, IndexStats, LimitsSource,
    ReloadableLimits, Request, Response, SystemClock, Timestamp,
};
use logfront_frontend::{
    format_bytes, split_by_interval, split_interval, weighted_parallelism, Context,
    FrontendBuilder, Handler, QueryError, StatsHandler,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "logfront")]
#[command(author, version, about = "Admission control and fan-out planning for log queries")]
struct Cli {
    /// Path to config file (default: ./logfront.yml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the schema periods, parallelism, sub-queries and cache key for a query
    Plan {
        /// Query text
        query: String,

        /// Tenant issuing the query
        #[arg(short, long, default_value = "fake")]
        tenant: String,

        /// Range start: RFC 3339, epoch milliseconds, "now" or "now-<duration>"
        #[arg(short, long, default_value = "now-1h")]
        start: String,

        /// Range end, same formats as --start
        #[arg(short, long, default_value = "now")]
        end: String,

        /// Resolution step (e.g. "1m")
        #[arg(long, default_value = "1m")]
        step: String,

        /// Return newest entries first
        #[arg(long)]
        backward: bool,

        /// Maximum number of entries for log queries
        #[arg(long, default_value = "100")]
        limit: u32,

        /// Run the query through the full frontend against a synthetic querier
        #[arg(long)]
        simulate: bool,

        /// Bytes the synthetic index statistics report per selector
        #[arg(long, default_value = "0")]
        estimate_bytes: u64,

        /// Latency of each synthetic sub-query (e.g. "50ms")
        #[arg(long, default_value = "10ms")]
        latency: String,

        /// Overall deadline for the simulated query
        #[arg(long, default_value = "30s")]
        timeout: String,
    },

    /// Validate the configuration
    CheckConfig,

    /// Write the default configuration
    DefaultConfig {
        /// Output path
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::DefaultConfig { output } = &cli.command {
        LogfrontConfig::write_default(output)?;
        println!("Generated default configuration: {}", output.display());
        return Ok(());
    }

    let (config, source) = LogfrontConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging)?;
    match &source {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("No configuration file found, using defaults"),
    }

    match cli.command {
        Commands::CheckConfig => check_config(&config),
        Commands::Plan {
            query,
            tenant,
            start,
            end,
            step,
            backward,
            limit,
            simulate,
            estimate_bytes,
            latency,
            timeout,
        } => {
            let now = SystemClock.now();
            let direction = if backward {
                Direction::Backward
            } else {
                Direction::Forward
            };
            let req = Request::builder(query)
                .time_range(parse_time(&start, now)?, parse_time(&end, now)?)
                .step(duration_millis(parse_duration(&step)?))
                .direction(direction)
                .limit(limit)
                .build()?;
            let options = SimulateOptions {
                enabled: simulate,
                estimate_bytes,
                latency: parse_duration(&latency)?,
                timeout: parse_duration(&timeout)?,
            };
            plan(&config, &tenant, req, options).await
        }
        Commands::DefaultConfig { .. } => Ok(()),
    }
}

fn init_tracing(logging: &LoggingSettings) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(logging.show_target)
        .with_thread_ids(logging.show_thread_ids)
        .with_file(logging.show_location)
        .with_line_number(logging.show_location)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set subscriber: {}", e))
}

/// Parse RFC 3339, epoch milliseconds, `now` or `now-<duration>`
fn parse_time(s: &str, now: Timestamp) -> anyhow::Result<Timestamp> {
    let s = s.trim();
    if s == "now" {
        return Ok(now);
    }
    if let Some(ago) = s.strip_prefix("now-") {
        return Ok(now - duration_millis(parse_duration(ago)?));
    }
    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }
    let dt = DateTime::parse_from_rfc3339(s).with_context(|| format!("Invalid time '{}'", s))?;
    Ok(dt.timestamp_millis())
}

fn format_time(ts: Timestamp) -> String {
    match DateTime::from_timestamp_millis(ts) {
        Some(dt) => dt.to_rfc3339(),
        None => format!("{}ms", ts),
    }
}

fn check_config(config: &LogfrontConfig) -> anyhow::Result<()> {
    config.validate()?;
    let timeline = config.schema.timeline()?;

    println!("Configuration is valid");
    println!("Schema periods:");
    for (i, period) in timeline.periods().iter().enumerate() {
        println!(
            "  [{}] from {} store={} schema={}",
            i, period.from, period.index_type, period.schema
        );
    }
    println!(
        "Default split interval: {}",
        format_duration(config.frontend.default_split_interval)
    );
    println!("Tenant overrides: {}", config.limits.overrides.len());
    Ok(())
}

struct SimulateOptions {
    enabled: bool,
    estimate_bytes: u64,
    latency: Duration,
    timeout: Duration,
}

async fn plan(
    config: &LogfrontConfig,
    tenant: &str,
    req: Request,
    options: SimulateOptions,
) -> anyhow::Result<()> {
    let timeline = Arc::new(config.schema.timeline()?);
    let limits = Arc::new(ReloadableLimits::new(Arc::new(config.limits.clone())));
    let tenant_limits = limits.for_tenant(tenant);

    println!("Query:    {}", req.query);
    println!("Tenant:   {}", tenant);
    println!("Range:    {} .. {}", format_time(req.start), format_time(req.end));

    println!("Schema periods:");
    for overlap in timeline.applicable_periods(req.start, req.end) {
        println!(
            "  [{}] {} for {}",
            overlap.index,
            overlap.period.index_type,
            format_duration(Duration::from_millis(overlap.duration_millis().max(0) as u64))
        );
    }

    let parallelism = weighted_parallelism(&timeline, &tenant_limits, req.start, req.end);
    if parallelism == 0 {
        println!("Parallelism: disabled for this tenant");
    } else {
        println!("Parallelism: {}", parallelism);
    }

    let interval = split_interval(
        tenant_limits.split_queries_by_interval,
        config.frontend.default_split_interval,
    );
    let pieces = split_by_interval(&req, duration_millis(interval));
    println!("Sub-queries ({} every {}):", pieces.len(), format_duration(interval));
    for piece in &pieces {
        println!("  {} .. {}", format_time(piece.start), format_time(piece.end));
    }

    let builder = FrontendBuilder::new(config.frontend.clone(), limits.clone(), timeline.clone());
    println!("Cache key: {}", builder.cache_keys().key(tenant, &req));

    if !options.enabled {
        return Ok(());
    }

    let builder = builder.with_stats(Arc::new(SyntheticStats {
        bytes: options.estimate_bytes,
    }));
    let handler = builder.build(Arc::new(SyntheticQuerier {
        latency: options.latency,
    }));
    let ctx = Context::new(tenant).with_timeout(options.timeout);

    match handler.handle(&ctx, req).await {
        Ok(resp) => {
            println!(
                "Simulation: ok, {} sub-queries, {} series",
                resp.stats.sub_queries,
                resp.series_count()
            );
        }
        Err(err) if err.is_client_error() => {
            println!("Simulation: rejected: {}", err);
        }
        Err(err) => {
            println!("Simulation: failed: {}", err);
        }
    }
    Ok(())
}

/// Index statistics reporting a fixed size for every selector
struct SyntheticStats {
    bytes: u64,
}

#[async_trait]
impl StatsHandler for SyntheticStats {
    async fn estimate(&self, ctx: &Context, req: Request) -> Result<IndexStats, QueryError> {
        debug!(
            tenant = %ctx.tenant(),
            selector = %req.query,
            bytes = %format_bytes(self.bytes),
            "Synthetic index stats"
        );
        Ok(IndexStats::with_bytes(self.bytes))
    }
}

/// Querier answering every sub-query with an empty result after a delay
struct SyntheticQuerier {
    latency: Duration,
}

#[async_trait]
impl Handler for SyntheticQuerier {
    async fn handle(&self, ctx: &Context, req: Request) -> Result<Response, QueryError> {
        ctx.run(async {
            tokio::time::sleep(self.latency).await;
            let mut resp = Response::empty_for(&req);
            resp.stats.sub_queries = 1;
            Ok(resp)
        })
        .await
    }
}

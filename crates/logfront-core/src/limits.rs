//! Per-tenant limits
//!
//! Limits are resolved per request through [`LimitsSource::for_tenant`]. The
//! source is shared by every in-flight request and is only ever read on the
//! query path; reloads go through [`ReloadableLimits::replace`], which swaps
//! a whole snapshot so a request never observes a half-applied update.

use crate::duration::{serde_duration, serde_duration_opt};
use crate::error::{CoreError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Effective limits for a single tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantLimits {
    /// Width of the intervals a range query is split into (0 = do not split)
    #[serde(with = "serde_duration")]
    pub split_queries_by_interval: Duration,
    /// Parallelism for periods served by the default index
    pub max_query_parallelism: usize,
    /// Parallelism for periods served by the TSDB index
    pub tsdb_max_query_parallelism: usize,
    /// Queries may not read data older than now minus this (0 = unlimited)
    #[serde(with = "serde_duration")]
    pub max_query_lookback: Duration,
    /// Longest accepted query range (0 = unlimited)
    #[serde(with = "serde_duration")]
    pub max_query_length: Duration,
    /// Estimated bytes a whole query may scan (0 = unlimited)
    pub max_query_bytes_read: u64,
    /// Estimated bytes a single split sub-query may scan (0 = unlimited)
    pub max_querier_bytes_read: u64,
    /// Distinct series a query may return (0 = unlimited)
    pub max_query_series: usize,
}

impl Default for TenantLimits {
    fn default() -> Self {
        Self {
            split_queries_by_interval: Duration::from_secs(30 * 60),
            max_query_parallelism: 32,
            tsdb_max_query_parallelism: 128,
            max_query_lookback: Duration::ZERO,
            max_query_length: Duration::from_secs(721 * 3600),
            max_query_bytes_read: 0,
            max_querier_bytes_read: 0,
            max_query_series: 500,
        }
    }
}

impl TenantLimits {
    /// Limits with every bound disabled and parallelism of one
    pub fn unlimited() -> Self {
        Self {
            split_queries_by_interval: Duration::ZERO,
            max_query_parallelism: 1,
            tsdb_max_query_parallelism: 1,
            max_query_lookback: Duration::ZERO,
            max_query_length: Duration::ZERO,
            max_query_bytes_read: 0,
            max_querier_bytes_read: 0,
            max_query_series: 0,
        }
    }

    /// Validate internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.max_querier_bytes_read > 0
            && self.max_query_bytes_read > 0
            && self.max_querier_bytes_read > self.max_query_bytes_read
        {
            return Err(CoreError::InvalidLimits(format!(
                "max_querier_bytes_read ({}) exceeds max_query_bytes_read ({})",
                self.max_querier_bytes_read, self.max_query_bytes_read
            )));
        }
        Ok(())
    }
}

/// Partial per-tenant override; unset fields fall back to the defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsOverride {
    #[serde(with = "serde_duration_opt", skip_serializing_if = "Option::is_none")]
    pub split_queries_by_interval: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_query_parallelism: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tsdb_max_query_parallelism: Option<usize>,
    #[serde(with = "serde_duration_opt", skip_serializing_if = "Option::is_none")]
    pub max_query_lookback: Option<Duration>,
    #[serde(with = "serde_duration_opt", skip_serializing_if = "Option::is_none")]
    pub max_query_length: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_query_bytes_read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_querier_bytes_read: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_query_series: Option<usize>,
}

impl LimitsOverride {
    /// Apply this override on top of `base`
    pub fn apply(&self, base: &TenantLimits) -> TenantLimits {
        TenantLimits {
            split_queries_by_interval: self
                .split_queries_by_interval
                .unwrap_or(base.split_queries_by_interval),
            max_query_parallelism: self.max_query_parallelism.unwrap_or(base.max_query_parallelism),
            tsdb_max_query_parallelism: self
                .tsdb_max_query_parallelism
                .unwrap_or(base.tsdb_max_query_parallelism),
            max_query_lookback: self.max_query_lookback.unwrap_or(base.max_query_lookback),
            max_query_length: self.max_query_length.unwrap_or(base.max_query_length),
            max_query_bytes_read: self.max_query_bytes_read.unwrap_or(base.max_query_bytes_read),
            max_querier_bytes_read: self
                .max_querier_bytes_read
                .unwrap_or(base.max_querier_bytes_read),
            max_query_series: self.max_query_series.unwrap_or(base.max_query_series),
        }
    }
}

/// Read-only accessor for per-tenant limits
pub trait LimitsSource: Send + Sync {
    /// Resolve the effective limits for `tenant`
    fn for_tenant(&self, tenant: &str) -> TenantLimits;
}

impl<L: LimitsSource + ?Sized> LimitsSource for Arc<L> {
    fn for_tenant(&self, tenant: &str) -> TenantLimits {
        (**self).for_tenant(tenant)
    }
}

/// Limits loaded from configuration: defaults plus per-tenant overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticLimits {
    /// Limits applied to every tenant without an override
    pub defaults: TenantLimits,
    /// Per-tenant overrides
    pub overrides: HashMap<String, LimitsOverride>,
}

impl StaticLimits {
    /// Limits with the given defaults and no overrides
    pub fn new(defaults: TenantLimits) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
        }
    }

    /// Add a tenant override
    pub fn with_override(mut self, tenant: impl Into<String>, o: LimitsOverride) -> Self {
        self.overrides.insert(tenant.into(), o);
        self
    }

    /// Parse limits from a YAML document
    pub fn from_yaml(content: &str) -> Result<Self> {
        let limits: StaticLimits = serde_yaml::from_str(content)?;
        limits.validate()?;
        Ok(limits)
    }

    /// Validate defaults and every resolved override
    pub fn validate(&self) -> Result<()> {
        self.defaults.validate()?;
        for (tenant, o) in &self.overrides {
            o.apply(&self.defaults)
                .validate()
                .map_err(|e| CoreError::InvalidLimits(format!("tenant '{}': {}", tenant, e)))?;
        }
        Ok(())
    }
}

impl LimitsSource for StaticLimits {
    fn for_tenant(&self, tenant: &str) -> TenantLimits {
        match self.overrides.get(tenant) {
            Some(o) => o.apply(&self.defaults),
            None => self.defaults.clone(),
        }
    }
}

/// Forces one split interval for every tenant, leaving other limits untouched
pub struct SplitOverride<L> {
    inner: L,
    split: Duration,
}

impl<L: LimitsSource> SplitOverride<L> {
    /// Wrap `inner`, overriding its split interval with `split`
    pub fn new(inner: L, split: Duration) -> Self {
        Self { inner, split }
    }
}

impl<L: LimitsSource> LimitsSource for SplitOverride<L> {
    fn for_tenant(&self, tenant: &str) -> TenantLimits {
        TenantLimits {
            split_queries_by_interval: self.split,
            ..self.inner.for_tenant(tenant)
        }
    }
}

/// Limits source whose whole snapshot can be swapped at runtime
pub struct ReloadableLimits {
    current: RwLock<Arc<dyn LimitsSource>>,
}

impl ReloadableLimits {
    /// Create a holder publishing `initial`
    pub fn new(initial: Arc<dyn LimitsSource>) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// The snapshot currently published
    pub fn snapshot(&self) -> Arc<dyn LimitsSource> {
        Arc::clone(&self.current.read())
    }

    /// Publish a new snapshot; requests holding the old one keep using it
    pub fn replace(&self, next: Arc<dyn LimitsSource>) {
        *self.current.write() = next;
        tracing::info!("Tenant limits reloaded");
    }
}

impl LimitsSource for ReloadableLimits {
    fn for_tenant(&self, tenant: &str) -> TenantLimits {
        self.snapshot().for_tenant(tenant)
    }
}

//! Schema timeline
//!
//! Periods are sorted by their start and never overlap: a period runs from
//! its own `from` up to the next period's `from`, and the last one is open
//! ended. Instants before the first period belong to no period.

use crate::error::{Result, SchemaError};
use crate::period::PeriodConfig;
use logfront_core::{TimeRange, Timestamp};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Schema configuration as written in YAML
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaConfig {
    /// Periods in ascending order of `from`
    pub configs: Vec<PeriodConfig>,
}

impl SchemaConfig {
    /// Load a schema configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SchemaError::Configuration(format!("Failed to read schema file: {}", e))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse a schema configuration from YAML
    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: SchemaConfig = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.configs.is_empty() {
            return Err(SchemaError::Empty);
        }
        check_sorted(&self.configs)
    }

    /// Build the timeline for these periods
    pub fn timeline(&self) -> Result<SchemaTimeline> {
        SchemaTimeline::new(self.configs.clone())
    }
}

fn check_sorted(configs: &[PeriodConfig]) -> Result<()> {
    for (i, pair) in configs.windows(2).enumerate() {
        if pair[1].from <= pair[0].from {
            return Err(SchemaError::OutOfOrder {
                index: i + 1,
                from: pair[1].from.to_string(),
                previous: pair[0].from.to_string(),
            });
        }
    }
    Ok(())
}

/// A period together with the part of a query range it covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodOverlap<'a> {
    /// Position of the period in the timeline
    pub index: usize,
    /// The period itself
    pub period: &'a PeriodConfig,
    /// Query range clipped to the period
    pub range: TimeRange,
}

impl PeriodOverlap<'_> {
    /// Covered time in milliseconds
    pub fn duration_millis(&self) -> i64 {
        self.range.duration_millis()
    }

    /// Degenerate entries carry the period of an instant but cover no time
    pub fn is_degenerate(&self) -> bool {
        self.range.is_empty()
    }
}

/// Ordered, validated schema periods
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaTimeline {
    periods: Vec<PeriodConfig>,
}

impl SchemaTimeline {
    /// Create a timeline; periods must be strictly ascending by start
    pub fn new(periods: Vec<PeriodConfig>) -> Result<Self> {
        check_sorted(&periods)?;
        Ok(Self { periods })
    }

    /// All periods in order
    pub fn periods(&self) -> &[PeriodConfig] {
        &self.periods
    }

    /// True when no period is configured
    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// Start of the first period
    pub fn first_start(&self) -> Option<Timestamp> {
        self.periods.first().map(|p| p.from.millis())
    }

    /// Effective end of the period at `index` (the next period's start)
    pub fn period_end(&self, index: usize) -> Timestamp {
        self.periods
            .get(index + 1)
            .map(|p| p.from.millis())
            .unwrap_or(Timestamp::MAX)
    }

    /// Index of the period containing `ts`, `None` before the first period
    pub fn period_index_at(&self, ts: Timestamp) -> Option<usize> {
        let after = self.periods.partition_point(|p| p.from.millis() <= ts);
        after.checked_sub(1)
    }

    /// Period containing `ts`
    pub fn period_at(&self, ts: Timestamp) -> Option<&PeriodConfig> {
        self.period_index_at(ts).map(|i| &self.periods[i])
    }

    /// Every period intersecting `[start, end)`, with clipped overlap bounds.
    ///
    /// When `start >= end` a single degenerate entry is returned for the
    /// period containing `start` (the first period if `start` precedes
    /// every period). Time before the first period contributes nothing.
    pub fn applicable_periods(&self, start: Timestamp, end: Timestamp) -> Vec<PeriodOverlap<'_>> {
        if self.periods.is_empty() {
            return Vec::new();
        }

        if start >= end {
            let index = self.period_index_at(start).unwrap_or(0);
            return vec![PeriodOverlap {
                index,
                period: &self.periods[index],
                range: TimeRange::new(start, start),
            }];
        }

        let query = TimeRange::new(start, end);
        let first = self.period_index_at(start).unwrap_or(0);

        self.periods[first..]
            .iter()
            .enumerate()
            .map(|(offset, period)| (first + offset, period))
            .take_while(|(_, period)| period.from.millis() < end)
            .filter_map(|(index, period)| {
                let span = TimeRange::new(period.from.millis(), self.period_end(index));
                span.intersect(&query).map(|range| PeriodOverlap {
                    index,
                    period,
                    range,
                })
            })
            .collect()
    }
}

//! logfront configuration, loaded from YAML

use anyhow::Context as _;
use logfront_core::StaticLimits;
use logfront_frontend::FrontendConfig;
use logfront_schema::{IndexType, PeriodConfig, SchemaConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "logfront.yml";

/// 2020-10-24T00:00:00Z
const DEFAULT_SCHEMA_START: i64 = 1_603_497_600_000;

/// Complete configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogfrontConfig {
    /// Query frontend settings
    pub frontend: FrontendConfig,
    /// Schema periods
    pub schema: SchemaConfig,
    /// Default and per-tenant limits
    pub limits: StaticLimits,
    /// Logging configuration
    pub logging: LoggingSettings,
}

impl Default for LogfrontConfig {
    fn default() -> Self {
        Self {
            frontend: FrontendConfig::default(),
            schema: SchemaConfig {
                configs: vec![PeriodConfig::new(DEFAULT_SCHEMA_START, IndexType::Tsdb)],
            },
            limits: StaticLimits::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Include target in logs
    pub show_target: bool,
    /// Include thread IDs in logs
    pub show_thread_ids: bool,
    /// Include file and line numbers
    pub show_location: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_location: false,
        }
    }
}

impl LogfrontConfig {
    /// Load and validate configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: LogfrontConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if given, else from `logfront.yml` when present,
    /// else fall back to defaults
    pub fn load(path: Option<&Path>) -> anyhow::Result<(Self, Option<PathBuf>)> {
        if let Some(path) = path {
            return Ok((Self::from_file(path)?, Some(path.to_path_buf())));
        }
        let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
        if default_path.exists() {
            return Ok((Self::from_file(&default_path)?, Some(default_path)));
        }
        Ok((Self::default(), None))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.schema.validate().context("Invalid schema configuration")?;
        self.limits.validate().context("Invalid limits configuration")?;
        if self.frontend.stats_concurrency == 0 {
            anyhow::bail!("frontend.stats_concurrency must be at least 1");
        }
        Ok(())
    }

    /// Write default config to a file
    pub fn write_default(path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(&Self::default())?;
        std::fs::write(path, yaml)?;
        Ok(())
    }
}

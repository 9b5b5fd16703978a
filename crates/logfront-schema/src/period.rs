//! Schema period definitions

use crate::error::{Result, SchemaError};
use chrono::{NaiveDate, TimeZone, Utc};
use logfront_core::Timestamp;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Start instant of a schema period, written as a UTC date in configs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayTime(pub Timestamp);

impl DayTime {
    /// Parse a `YYYY-MM-DD` date at UTC midnight
    pub fn parse(s: &str) -> Result<Self> {
        let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map_err(|_| SchemaError::InvalidDate(s.to_string()))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| SchemaError::InvalidDate(s.to_string()))?;
        Ok(DayTime(Utc.from_utc_datetime(&midnight).timestamp_millis()))
    }

    /// Milliseconds since the Unix epoch
    pub fn millis(&self) -> Timestamp {
        self.0
    }
}

impl fmt::Display for DayTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Utc.timestamp_millis_opt(self.0).single() {
            Some(dt) if self.0 % 86_400_000 == 0 => write!(f, "{}", dt.format("%Y-%m-%d")),
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

impl Serialize for DayTime {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DayTime {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(d)?;
        DayTime::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Index backend serving a period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IndexType {
    /// Columnar TSDB index; supports index statistics and higher parallelism
    Tsdb,
    /// Key-value index shipped to object storage
    BoltdbShipper,
    /// Local key-value index
    Boltdb,
    /// Any other legacy store
    #[serde(other)]
    Other,
}

impl IndexType {
    /// True for periods served by the TSDB index
    pub fn is_tsdb(&self) -> bool {
        matches!(self, IndexType::Tsdb)
    }

    /// Whether the statistics path can estimate query cost for this index
    pub fn supports_index_stats(&self) -> bool {
        self.is_tsdb()
    }
}

impl fmt::Display for IndexType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexType::Tsdb => write!(f, "tsdb"),
            IndexType::BoltdbShipper => write!(f, "boltdb-shipper"),
            IndexType::Boltdb => write!(f, "boltdb"),
            IndexType::Other => write!(f, "other"),
        }
    }
}

/// One schema period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodConfig {
    /// First day served by this period
    pub from: DayTime,
    /// Index backend
    #[serde(rename = "store")]
    pub index_type: IndexType,
    /// Object store holding chunks
    #[serde(default)]
    pub object_store: String,
    /// Schema version
    #[serde(default = "default_schema_version")]
    pub schema: String,
}

fn default_schema_version() -> String {
    "v12".to_string()
}

impl PeriodConfig {
    /// Create a period starting at `from`
    pub fn new(from: Timestamp, index_type: IndexType) -> Self {
        Self {
            from: DayTime(from),
            index_type,
            object_store: String::new(),
            schema: default_schema_version(),
        }
    }

    /// Create a period starting at a `YYYY-MM-DD` date
    pub fn starting_on(date: &str, index_type: IndexType) -> Result<Self> {
        Ok(Self::new(DayTime::parse(date)?.millis(), index_type))
    }
}

//! Human-readable durations for configuration files
//!
//! Accepts a sequence of `<integer><unit>` terms such as `"30m"`, `"1h30m"`
//! or `"721h"`, with units `ms`, `s`, `m`, `h`, `d` and `w`. A bare `"0"`
//! means zero.

use crate::error::{CoreError, Result};
use std::time::Duration;

const MS_PER_SECOND: u64 = 1_000;
const MS_PER_MINUTE: u64 = 60 * MS_PER_SECOND;
const MS_PER_HOUR: u64 = 60 * MS_PER_MINUTE;
const MS_PER_DAY: u64 = 24 * MS_PER_HOUR;
const MS_PER_WEEK: u64 = 7 * MS_PER_DAY;

/// Parse a duration string into a `Duration`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(CoreError::InvalidDuration("empty duration".to_string()));
    }
    if s == "0" {
        return Ok(Duration::ZERO);
    }

    let mut total_ms: u64 = 0;
    let mut rest = s;

    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(CoreError::InvalidDuration(format!("expected a number in '{}'", s)));
        }
        let num: u64 = rest[..digits]
            .parse()
            .map_err(|_| CoreError::InvalidDuration(format!("invalid number in '{}'", s)))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let scale = match unit {
            "ms" => 1,
            "s" => MS_PER_SECOND,
            "m" => MS_PER_MINUTE,
            "h" => MS_PER_HOUR,
            "d" => MS_PER_DAY,
            "w" => MS_PER_WEEK,
            "" => {
                return Err(CoreError::InvalidDuration(format!("missing unit in '{}'", s)));
            }
            other => {
                return Err(CoreError::InvalidDuration(format!(
                    "unknown unit '{}' in '{}'",
                    other, s
                )));
            }
        };

        total_ms = num
            .checked_mul(scale)
            .and_then(|v| total_ms.checked_add(v))
            .ok_or_else(|| CoreError::InvalidDuration(format!("duration overflows: '{}'", s)))?;
    }

    Ok(Duration::from_millis(total_ms))
}

/// Format a duration using the largest units that divide it exactly
pub fn format_duration(d: Duration) -> String {
    let mut ms = d.as_millis() as u64;
    if ms == 0 {
        return "0s".to_string();
    }

    let mut out = String::new();
    for (scale, unit) in [
        (MS_PER_WEEK, "w"),
        (MS_PER_DAY, "d"),
        (MS_PER_HOUR, "h"),
        (MS_PER_MINUTE, "m"),
        (MS_PER_SECOND, "s"),
        (1, "ms"),
    ] {
        if ms >= scale {
            out.push_str(&format!("{}{}", ms / scale, unit));
            ms %= scale;
        }
    }
    out
}

/// Duration as signed milliseconds, saturating at `i64::MAX`
pub fn duration_millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

/// Serde adapter for `Duration` fields written as duration strings
pub mod serde_duration {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<Duration>` fields written as duration strings
pub mod serde_duration_opt {
    use super::{format_duration, parse_duration};
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&format_duration(*d)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        raw.map(|r| parse_duration(&r).map_err(serde::de::Error::custom))
            .transpose()
    }
}

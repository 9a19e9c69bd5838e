// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human duration strings ("500ms", "30s", "5m", "1h").

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationError {
    #[error("empty duration string")]
    Empty,
    #[error("invalid number in duration: {0}")]
    InvalidNumber(String),
    #[error("unknown duration suffix: {0}")]
    UnknownSuffix(String),
}

/// Parse a duration such as `"250ms"`, `"30s"`, `"5m"`, `"2h"` or `"1d"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, DurationError> {
    let s = s.trim();
    if s.is_empty() {
        return Err(DurationError::Empty);
    }

    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num_str, suffix) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| DurationError::InvalidNumber(s.to_string()))?;

    let secs_per_unit = match suffix.trim() {
        "ms" | "millis" | "millisecond" | "milliseconds" => {
            return Ok(Duration::from_millis(num));
        }
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1,
        "m" | "min" | "mins" | "minute" | "minutes" => 60,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600,
        "d" | "day" | "days" => 86400,
        other => return Err(DurationError::UnknownSuffix(other.to_string())),
    };

    Ok(Duration::from_secs(num.saturating_mul(secs_per_unit)))
}

/// Serde adapter for `Duration` fields written as human strings.
pub mod human {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{}ms", d.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

/// Serde adapter for `Option<Duration>` fields written as human strings.
pub mod human_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => super::human::serialize(d, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        raw.map(|r| super::parse_duration(&r).map_err(serde::de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
#[path = "duration_tests.rs"]
mod tests;

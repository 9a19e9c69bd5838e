// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timestamp and elapsed-time formatting for log lines.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current UTC time as `2026-01-30T08:14:09Z`.
pub fn format_utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Epoch milliseconds as an RFC 3339 UTC timestamp with millisecond precision.
pub fn format_epoch_ms(epoch_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms as i64)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| epoch_ms.to_string())
}

/// Short elapsed time: `"850ms"`, `"12.4s"`, `"3m"`, `"1h5m"`.
pub fn format_elapsed_ms(ms: u64) -> String {
    if ms < 1_000 {
        return format!("{}ms", ms);
    }
    if ms < 60_000 {
        return format!("{:.1}s", ms as f64 / 1000.0);
    }
    let secs = ms / 1000;
    if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        let h = secs / 3600;
        let m = (secs % 3600) / 60;
        if m > 0 {
            format!("{}h{}m", h, m)
        } else {
            format!("{}h", h)
        }
    }
}

#[cfg(test)]
#[path = "time_fmt_tests.rs"]
mod tests;

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting.

use chrono::{DateTime, SecondsFormat, Utc};

/// Format a UTC timestamp as RFC3339 using a `Z` suffix.
pub fn format_utc_rfc3339(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time in the format used for submission timestamps.
pub fn now_rfc3339() -> String {
    format_utc_rfc3339(Utc::now())
}

/// Round elapsed wall time to whole seconds.
pub fn rounded_secs(elapsed: std::time::Duration) -> u64 {
    elapsed.as_secs_f64().round() as u64
}

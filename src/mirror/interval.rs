//! Sync interval policies and duration expressions.
//!
//! Expressions are short strings found in mirror configs:
//!
//! - durations: `"30s"`, `"90m"`, `"6h"`, `"1d"`, compounded as `"1h30m"`
//! - intervals: either a duration (`"6h"`, run every six hours) or
//!   `"daily@HH:MM"` (once a day at a UTC wall-clock time)

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use serde::{Deserialize, Deserializer, Serializer};

use crate::error::{OrchestratorError, Result};

const DAILY_PREFIX: &str = "daily@";

/// How often a `Sync` mirror should be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalPolicy {
    /// Fixed period measured from the previous sync
    Every(TimeDelta),
    /// Once a day at the given UTC time
    DailyAt(NaiveTime),
}

impl IntervalPolicy {
    /// Earliest time the next sync may start given when the last one started.
    pub fn next_sync_time(&self, last_sync_at: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            IntervalPolicy::Every(period) => last_sync_at
                .checked_add_signed(*period)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            IntervalPolicy::DailyAt(at) => {
                let candidate = last_sync_at.date_naive().and_time(*at).and_utc();
                if candidate > last_sync_at {
                    candidate
                } else {
                    candidate + TimeDelta::days(1)
                }
            }
        }
    }
}

impl FromStr for IntervalPolicy {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(at) = s.strip_prefix(DAILY_PREFIX) {
            let time = NaiveTime::parse_from_str(at.trim(), "%H:%M")
                .map_err(|_| OrchestratorError::InvalidInterval(s.to_string()))?;
            return Ok(IntervalPolicy::DailyAt(time));
        }
        parse_duration(s)
            .map(IntervalPolicy::Every)
            .map_err(|_| OrchestratorError::InvalidInterval(s.to_string()))
    }
}

impl fmt::Display for IntervalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntervalPolicy::Every(period) => write!(f, "{}", format_duration(*period)),
            IntervalPolicy::DailyAt(at) => write!(f, "{}{}", DAILY_PREFIX, at.format("%H:%M")),
        }
    }
}

impl<'de> Deserialize<'de> for IntervalPolicy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl serde::Serialize for IntervalPolicy {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Parse a positive duration expression such as `"1h30m"`.
pub fn parse_duration(s: &str) -> Result<TimeDelta> {
    let invalid = || OrchestratorError::InvalidDuration(s.to_string());
    let mut total = TimeDelta::zero();
    let mut digits = String::new();
    let mut saw_unit = false;

    for ch in s.trim().chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        if digits.is_empty() {
            return Err(invalid());
        }
        let value: i64 = digits.parse().map_err(|_| invalid())?;
        let part = match ch {
            's' => TimeDelta::try_seconds(value),
            'm' => TimeDelta::try_minutes(value),
            'h' => TimeDelta::try_hours(value),
            'd' => TimeDelta::try_days(value),
            _ => None,
        }
        .ok_or_else(invalid)?;
        total = total.checked_add(&part).ok_or_else(invalid)?;
        digits.clear();
        saw_unit = true;
    }

    if !digits.is_empty() || !saw_unit || total <= TimeDelta::zero() {
        return Err(invalid());
    }
    Ok(total)
}

/// Inverse of [`parse_duration`], using the largest units first.
pub fn format_duration(d: TimeDelta) -> String {
    let mut secs = d.num_seconds();
    if secs <= 0 {
        return "0s".to_string();
    }
    let mut out = String::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60), ("s", 1)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    out
}

/// Serde adapter for `TimeDelta` fields written as duration expressions.
pub mod duration_expr {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}

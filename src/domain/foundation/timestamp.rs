//! Timestamp value object for immutable points in time.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Immutable point in time, always UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a timestamp from a DateTime<Utc>.
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the inner DateTime.
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Checks if this timestamp is before another.
    pub fn is_before(&self, other: &Timestamp) -> bool {
        self.0 < other.0
    }

    /// Checks if this timestamp is after another.
    pub fn is_after(&self, other: &Timestamp) -> bool {
        self.0 > other.0
    }

    /// Returns the duration from another timestamp to this one.
    ///
    /// Returns negative duration if other is after self.
    pub fn duration_since(&self, other: &Timestamp) -> Duration {
        self.0.signed_duration_since(other.0)
    }

    /// Creates a new timestamp by adding the specified number of seconds.
    ///
    /// Saturates at the representable range.
    pub fn plus_secs(&self, secs: i64) -> Self {
        self.saturating_offset(Duration::try_seconds(secs), secs >= 0)
    }

    /// Creates a new timestamp by subtracting the specified number of seconds.
    ///
    /// Saturates at the representable range.
    pub fn minus_secs(&self, secs: i64) -> Self {
        self.saturating_offset(Duration::try_seconds(secs).map(|d| -d), secs < 0)
    }

    /// Creates a new timestamp by adding the specified number of minutes.
    ///
    /// Saturates at the representable range.
    pub fn plus_minutes(&self, minutes: i64) -> Self {
        self.saturating_offset(Duration::try_minutes(minutes), minutes >= 0)
    }

    /// Adds `minutes`, `None` if the result is not representable.
    pub fn checked_plus_minutes(&self, minutes: i64) -> Option<Self> {
        Duration::try_minutes(minutes)
            .and_then(|delta| self.0.checked_add_signed(delta))
            .map(Self)
    }

    fn saturating_offset(&self, delta: Option<Duration>, forward: bool) -> Self {
        match delta.and_then(|delta| self.0.checked_add_signed(delta)) {
            Some(dt) => Self(dt),
            None if forward => Self(DateTime::<Utc>::MAX_UTC),
            None => Self(DateTime::<Utc>::MIN_UTC),
        }
    }

    /// Creates a timestamp from Unix seconds, `None` if out of range.
    pub fn from_unix_secs(secs: i64) -> Option<Self> {
        DateTime::<Utc>::from_timestamp(secs, 0).map(Self)
    }

    /// Returns the timestamp as Unix seconds.
    pub fn as_unix_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// Parses an HTTP date header value.
    ///
    /// Accepts RFC 2822 (`Tue, 15 Oct 2024 10:30:00 +0000`) and the RFC 7231
    /// IMF-fixdate form that ends in `GMT`.
    pub fn parse_http_date(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
            return Some(Self(dt.with_timezone(&Utc)));
        }
        let normalized = value.strip_suffix("GMT").map(|v| format!("{}+0000", v));
        normalized
            .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
            .map(|dt| Self(dt.with_timezone(&Utc)))
    }

    /// Formats the timestamp as an RFC 2822 date (as used in HTTP date headers).
    pub fn to_rfc2822(&self) -> String {
        self.0.to_rfc2822()
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::now()
    }
}

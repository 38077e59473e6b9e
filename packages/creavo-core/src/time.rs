//! Time helpers.
//!
//! Everything goes through `chrono::Utc` so timestamps stored in dispute
//! flags, messages and backup documents share one clock and one format.

use chrono::{DateTime, SecondsFormat, Utc};

/// Returns the current instant in UTC.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Formats an instant as ISO 8601 with millisecond precision and a `Z`
/// suffix, e.g. `2024-05-01T12:00:00.000Z`.
pub fn to_iso8601(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

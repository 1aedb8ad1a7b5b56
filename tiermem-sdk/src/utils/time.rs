//! Time Utilities

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Get current UTC timestamp
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Format datetime as RFC 3339 string
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Whether an item written at `written` has outlived `ttl` at `now`.
///
/// The boundary itself is not expired.
pub fn is_expired(written: DateTime<Utc>, ttl: Duration, now: DateTime<Utc>) -> bool {
    match chrono::Duration::from_std(ttl) {
        Ok(ttl) => now.signed_duration_since(written) > ttl,
        Err(_) => false,
    }
}

//! SDK Utilities
//!
//! Common utilities for the SDK.

mod hashing;
mod time;

pub use hashing::{content_hash, payload_hash};
pub use time::{format_datetime, is_expired, now_utc};

//! Command implementations for tiermem CLI.
//!
//! Each submodule implements the logic for a command group.

pub mod maintain;
pub mod search;
pub mod store;

use anyhow::{Context, Result};
use tiermem_sdk::Value;

/// Parse a payload argument: JSON if it parses, otherwise a plain string.
pub fn parse_payload(raw: &str) -> Result<Value> {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json_exact(json).context("Unsupported payload"),
        Err(_) => Ok(Value::from(raw)),
    }
}

/// Render a payload for display.
pub fn render(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => format!("<{} bytes>", bytes.len()),
        other => match other.to_json() {
            Some(json) => json.to_string(),
            None => format!("<{}>", other.kind_name()),
        },
    }
}

/// Shorten long output to `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let head: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

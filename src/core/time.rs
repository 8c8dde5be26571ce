//! Shared timestamp/event helpers.

use chrono::{Local, NaiveDate};
use serde_json::Value as JsonValue;
use ulid::Ulid;

use crate::core::error::AetherError;

/// Returns unix-epoch seconds with `Z` suffix (e.g. `1771220592Z`).
pub fn now_epoch_z() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{}Z", secs)
}

pub fn new_event_id() -> String {
    Ulid::new().to_string()
}

/// Local calendar date; the daily-claim cooldown resets at local midnight.
pub fn today_local() -> NaiveDate {
    Local::now().date_naive()
}

/// Parse a `YYYY-MM-DD` date as supplied on the command line or stored in SQLite.
pub fn parse_date(raw: &str) -> Result<NaiveDate, AetherError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| AetherError::ValidationError(format!("invalid date '{}': {}", raw, e)))
}

/// Standard command response envelope shape used across CLI surfaces.
pub fn command_envelope(cmd: &str, status: &str, extra: JsonValue) -> JsonValue {
    let mut base = serde_json::json!({
        "envelope_version": "1.0.0",
        "ts": now_epoch_z(),
        "event_id": new_event_id(),
        "cmd": cmd,
        "status": status
    });
    if let (Some(base_obj), Some(extra_obj)) = (base.as_object_mut(), extra.as_object()) {
        for (k, v) in extra_obj {
            base_obj.insert(k.clone(), v.clone());
        }
    }
    base
}

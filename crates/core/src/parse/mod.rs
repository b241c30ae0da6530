//! Parsers
//!
//! Deterministic, pure functions from raw collector artifacts to typed
//! records. Parsers tolerate unknown fields and missing optional sections;
//! a malformed artifact is dropped with a debug note and the run continues.

pub mod cert;
pub mod event;
pub mod prom;
pub mod quantity;
pub mod resource;
pub mod top;

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Parse an RFC 3339 / Kubernetes timestamp, tolerating nanoseconds.
pub(crate) fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Nested lookup with dot notation, `None` on any missing step.
pub(crate) fn dot_get<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for key in path.split('.') {
        current = current.get(key)?;
    }
    Some(current)
}

pub(crate) fn dot_str<'a>(value: &'a Value, path: &str) -> Option<&'a str> {
    dot_get(value, path).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn timestamps_parse_with_and_without_nanos() {
        assert!(parse_timestamp("2024-03-01T12:00:00Z").is_some());
        assert!(parse_timestamp("2024-03-01T12:00:00.123456789Z").is_some());
        assert!(parse_timestamp("not-a-time").is_none());
    }

    #[test]
    fn dot_get_walks_nested_objects() {
        let value = json!({"spec": {"template": {"metadata": {"name": "x"}}}});
        assert_eq!(
            dot_str(&value, "spec.template.metadata.name"),
            Some("x")
        );
        assert!(dot_get(&value, "spec.missing.name").is_none());
    }
}

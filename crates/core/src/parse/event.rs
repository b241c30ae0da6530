//! Event parsing
//!
//! Converts `kubectl get events -o json` output into [`EventRecord`]s,
//! coalescing duplicates with the same `(reason, involved object)` by
//! taking the latest timestamp and summing counts.

use std::collections::BTreeMap;

use serde_json::Value;

use super::{dot_str, parse_timestamp};
use crate::models::{EventRecord, EventType, ObjectRef};

/// Cap on retained events per subject.
pub const MAX_EVENTS: usize = 200;

pub fn parse_events(bytes: &[u8]) -> Result<Vec<EventRecord>, String> {
    let value: Value =
        serde_json::from_slice(bytes).map_err(|e| format!("invalid event JSON: {e}"))?;
    let items = value
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_else(|| vec![value.clone()]);

    let mut coalesced: BTreeMap<(String, String, String, String), EventRecord> = BTreeMap::new();

    for item in &items {
        let Some(event) = parse_single(item) else {
            continue;
        };
        let key = (
            event.reason.clone(),
            event.involved_object.kind.clone(),
            event.involved_object.namespace.clone().unwrap_or_default(),
            event.involved_object.name.clone(),
        );
        match coalesced.get_mut(&key) {
            Some(existing) => {
                existing.count += event.count;
                if event.last_timestamp > existing.last_timestamp {
                    existing.last_timestamp = event.last_timestamp;
                    existing.message = event.message;
                }
                if existing.first_timestamp.is_none()
                    || (event.first_timestamp.is_some()
                        && event.first_timestamp < existing.first_timestamp)
                {
                    existing.first_timestamp = event.first_timestamp;
                }
            }
            None => {
                coalesced.insert(key, event);
            }
        }
    }

    let mut events: Vec<EventRecord> = coalesced.into_values().collect();
    // Most recent first, then by reason for a stable order
    events.sort_by(|a, b| {
        b.last_timestamp
            .cmp(&a.last_timestamp)
            .then_with(|| a.reason.cmp(&b.reason))
    });
    events.truncate(MAX_EVENTS);
    Ok(events)
}

fn parse_single(value: &Value) -> Option<EventRecord> {
    let reason = value.get("reason")?.as_str()?.to_string();
    let event_type = match value.get("type").and_then(Value::as_str) {
        Some("Warning") => EventType::Warning,
        _ => EventType::Normal,
    };
    let involved = value.get("involvedObject")?;

    Some(EventRecord {
        event_type,
        reason,
        message: value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        count: value.get("count").and_then(Value::as_u64).unwrap_or(1) as u32,
        first_timestamp: value
            .get("firstTimestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp),
        last_timestamp: value
            .get("lastTimestamp")
            .and_then(Value::as_str)
            .and_then(parse_timestamp)
            .or_else(|| {
                dot_str(value, "eventTime").and_then(parse_timestamp)
            }),
        involved_object: ObjectRef {
            kind: involved
                .get("kind")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: involved
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            namespace: involved
                .get("namespace")
                .and_then(Value::as_str)
                .map(str::to_string),
            uid: involved
                .get("uid")
                .and_then(Value::as_str)
                .map(str::to_string),
        },
    })
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Field name whose changes drive activation history.
pub const ACTIVE_FIELD: &str = "active";

/// Decoded old/new value map of an audit row.
pub type StateMap = Map<String, JsonValue>;

/// A single field-level state change.
///
/// Events are:
/// - **immutable** (treat them as facts)
/// - totally ordered by `occurred_at`
/// - tolerant: a payload that fails to decode is an empty map, never an error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    occurred_at: DateTime<Utc>,
    old_values: StateMap,
    new_values: StateMap,
}

/// Classification of an audit event with respect to the `active` flag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivationChange {
    Activated,
    Deactivated,
    /// Missing key, unrelated field change, or a non-boolean value.
    None,
}

impl AuditEvent {
    pub fn new(occurred_at: DateTime<Utc>, old_values: StateMap, new_values: StateMap) -> Self {
        Self {
            occurred_at,
            old_values,
            new_values,
        }
    }

    /// Convenience constructor for an `active` flip (`old` → `new`).
    pub fn active_change(occurred_at: DateTime<Utc>, old: bool, new: bool) -> Self {
        let mut old_values = StateMap::new();
        old_values.insert(ACTIVE_FIELD.to_string(), JsonValue::Bool(old));
        let mut new_values = StateMap::new();
        new_values.insert(ACTIVE_FIELD.to_string(), JsonValue::Bool(new));
        Self::new(occurred_at, old_values, new_values)
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    pub fn old_values(&self) -> &StateMap {
        &self.old_values
    }

    pub fn new_values(&self) -> &StateMap {
        &self.new_values
    }

    /// Boolean value of `field` before the change, if present and boolean.
    pub fn old_flag(&self, field: &str) -> Option<bool> {
        self.old_values.get(field).and_then(JsonValue::as_bool)
    }

    /// Boolean value of `field` after the change, if present and boolean.
    pub fn new_flag(&self, field: &str) -> Option<bool> {
        self.new_values.get(field).and_then(JsonValue::as_bool)
    }

    /// Classify this event as an activation, a deactivation, or neither.
    pub fn determine_change(&self) -> ActivationChange {
        match (self.old_flag(ACTIVE_FIELD), self.new_flag(ACTIVE_FIELD)) {
            (Some(false), Some(true)) => ActivationChange::Activated,
            (Some(true), Some(false)) => ActivationChange::Deactivated,
            _ => ActivationChange::None,
        }
    }
}

/// Decode a raw audit payload.
///
/// `None`, `""`, `"null"`, invalid JSON and non-object JSON all yield an empty map.
pub fn decode_payload(payload: Option<&str>) -> StateMap {
    let raw = match payload {
        None | Some("") | Some("null") => return StateMap::new(),
        Some(raw) => raw,
    };

    match serde_json::from_str::<JsonValue>(raw) {
        Ok(JsonValue::Object(map)) => map,
        Ok(_) => StateMap::new(),
        Err(err) => {
            tracing::debug!(error = %err, "discarding malformed audit payload");
            StateMap::new()
        }
    }
}

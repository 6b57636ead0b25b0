use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use billing_core::AssociationId;

use crate::event::{decode_payload, AuditEvent};

/// One row of the audit table, exactly as persisted.
///
/// Notes:
/// - `auditable_type` names the audited model (e.g. `"financer_module"`).
/// - `old_values` / `new_values` are raw JSON text and may be missing, `"null"`
///   or corrupt; decoding never fails (see [`AuditRecord::decode`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    auditable_type: String,
    auditable_id: AssociationId,

    old_values: Option<String>,
    new_values: Option<String>,

    created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        auditable_type: impl Into<String>,
        auditable_id: AssociationId,
        old_values: Option<String>,
        new_values: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            auditable_type: auditable_type.into(),
            auditable_id,
            old_values,
            new_values,
            created_at,
        }
    }

    pub fn auditable_type(&self) -> &str {
        &self.auditable_type
    }

    pub fn auditable_id(&self) -> AssociationId {
        self.auditable_id
    }

    pub fn old_values(&self) -> Option<&str> {
        self.old_values.as_deref()
    }

    pub fn new_values(&self) -> Option<&str> {
        self.new_values.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Decode the raw JSON payloads into a typed [`AuditEvent`].
    ///
    /// Malformed payloads decode to empty maps.
    pub fn decode(&self) -> AuditEvent {
        AuditEvent::new(
            self.created_at,
            decode_payload(self.old_values.as_deref()),
            decode_payload(self.new_values.as_deref()),
        )
    }
}

//! `billing-audit` : activation history reconstructed from the audit log.
//!
//! The audit log is a generic, append-only table of field-level changes
//! (old values / new values as JSON). This crate turns the rows that concern a
//! single pivot association into an [`ActivationHistory`] value and replays it
//! with pure folds. Nothing here performs IO.

pub mod event;
pub mod history;
pub mod record;

pub use event::{ActivationChange, AuditEvent, StateMap, ACTIVE_FIELD};
pub use history::ActivationHistory;
pub use record::AuditRecord;

//! Collision-free invoice number allocation.
//!
//! A sequence is scoped to `(invoice type, year)`. Allocation takes the
//! exclusive lock of that sequence, then draws values until the formatted
//! number is not already used by a persisted invoice. Values consumed by a
//! collision are never handed out again. Distinct keys never contend.

pub mod in_memory;
pub mod postgres;

use std::fmt;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use billing_invoicing::{InvoiceType, NumberFormat};

use crate::config::NumberingConfig;
use crate::error::SequenceError;

pub use in_memory::{InMemoryInvoiceNumberRegistry, InMemoryInvoiceSequenceStore};
pub use postgres::PostgresInvoiceSequenceStore;

/// Scope of one counter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub invoice_type: InvoiceType,
    pub year: i32,
}

impl SequenceKey {
    pub fn new(invoice_type: InvoiceType, year: i32) -> Self {
        Self { invoice_type, year }
    }
}

impl fmt::Display for SequenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.invoice_type, self.year)
    }
}

/// Result of a successful allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocatedNumber {
    pub key: SequenceKey,
    pub sequence: u64,
    pub number: String,
    /// Candidates drawn, including the accepted one.
    pub attempts: u32,
}

/// Invoice numbers already used by persisted invoices.
pub trait InvoiceNumberRegistry: Send + Sync {
    fn exists(&self, number: &str) -> Result<bool, SequenceError>;

    /// Record a number as used (the invoice was persisted).
    fn register(&self, number: &str) -> Result<(), SequenceError>;
}

impl<R> InvoiceNumberRegistry for Arc<R>
where
    R: InvoiceNumberRegistry + ?Sized,
{
    fn exists(&self, number: &str) -> Result<bool, SequenceError> {
        (**self).exists(number)
    }

    fn register(&self, number: &str) -> Result<(), SequenceError> {
        (**self).register(number)
    }
}

/// Per-key counters with exclusive allocation.
///
/// Implementations must:
/// - hold the key's lock for the whole draw-and-check loop
/// - persist the last drawn value only when a free number is found
/// - fail with [`SequenceError::Exhausted`] after `max_attempts` collisions,
///   leaving the counter untouched
pub trait InvoiceSequenceStore: Send + Sync {
    fn allocate(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        max_attempts: u32,
    ) -> Result<AllocatedNumber, SequenceError>;

    /// Last value handed out for `key` (0 when the sequence was never used).
    fn current(&self, key: &SequenceKey) -> Result<u64, SequenceError>;
}

impl<S> InvoiceSequenceStore for Arc<S>
where
    S: InvoiceSequenceStore + ?Sized,
{
    fn allocate(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        max_attempts: u32,
    ) -> Result<AllocatedNumber, SequenceError> {
        (**self).allocate(key, format, max_attempts)
    }

    fn current(&self, key: &SequenceKey) -> Result<u64, SequenceError> {
        (**self).current(key)
    }
}

/// Draw candidates after `last` until `is_taken` reports a free one.
///
/// Returns the accepted sequence value, its formatted number and the number
/// of attempts.
pub(crate) fn draw_free_number(
    key: &SequenceKey,
    last: u64,
    format: &NumberFormat,
    max_attempts: u32,
    mut is_taken: impl FnMut(&str) -> Result<bool, SequenceError>,
) -> Result<(u64, String, u32), SequenceError> {
    let mut candidate = last;
    for attempt in 1..=max_attempts {
        candidate += 1;
        let number = format.format(&key.invoice_type, key.year, candidate);
        if !is_taken(&number)? {
            return Ok((candidate, number, attempt));
        }
        tracing::debug!(%key, %number, attempt, "invoice number already taken");
    }

    Err(SequenceError::Exhausted {
        key: key.to_string(),
        attempts: max_attempts,
    })
}

/// Front door for number allocation: applies the configured format and retry
/// ceiling and derives the year from the invoice date.
#[derive(Debug, Clone)]
pub struct InvoiceNumberSequencer<S> {
    store: S,
    format: NumberFormat,
    max_attempts: u32,
}

impl<S: InvoiceSequenceStore> InvoiceNumberSequencer<S> {
    pub fn new(store: S, format: NumberFormat, max_attempts: u32) -> Self {
        Self {
            store,
            format,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(store: S, config: &NumberingConfig) -> Self {
        Self::new(store, config.number_format(), config.max_attempts)
    }

    pub fn format(&self) -> &NumberFormat {
        &self.format
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Allocate the next free number for `invoice_type` in the year of `date`.
    #[instrument(skip(self), fields(invoice_type = %invoice_type), err)]
    pub fn generate(&self, invoice_type: &InvoiceType, date: NaiveDate) -> Result<String, SequenceError> {
        Ok(self.allocate(invoice_type, date)?.number)
    }

    pub fn allocate(&self, invoice_type: &InvoiceType, date: NaiveDate) -> Result<AllocatedNumber, SequenceError> {
        let key = SequenceKey::new(invoice_type.clone(), date.year());
        let allocated = self.store.allocate(&key, &self.format, self.max_attempts)?;
        if allocated.attempts > 1 {
            tracing::info!(
                key = %allocated.key,
                number = %allocated.number,
                attempts = allocated.attempts,
                "invoice number allocated after collisions"
            );
        }
        Ok(allocated)
    }
}

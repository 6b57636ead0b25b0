use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use billing_invoicing::NumberFormat;

use super::{draw_free_number, AllocatedNumber, InvoiceNumberRegistry, InvoiceSequenceStore, SequenceKey};
use crate::error::SequenceError;

/// Set of used invoice numbers.
#[derive(Debug, Default)]
pub struct InMemoryInvoiceNumberRegistry {
    numbers: RwLock<HashSet<String>>,
}

impl InMemoryInvoiceNumberRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvoiceNumberRegistry for InMemoryInvoiceNumberRegistry {
    fn exists(&self, number: &str) -> Result<bool, SequenceError> {
        let numbers = self
            .numbers
            .read()
            .map_err(|_| SequenceError::Poisoned("invoice number registry"))?;
        Ok(numbers.contains(number))
    }

    fn register(&self, number: &str) -> Result<(), SequenceError> {
        let mut numbers = self
            .numbers
            .write()
            .map_err(|_| SequenceError::Poisoned("invoice number registry"))?;
        if !numbers.insert(number.to_string()) {
            return Err(SequenceError::Conflict(format!("invoice number {number} already registered")));
        }
        Ok(())
    }
}

/// In-memory sequences: one mutex per key, so a key has a single writer while
/// distinct keys allocate in parallel.
///
/// Intended for tests/dev.
#[derive(Debug)]
pub struct InMemoryInvoiceSequenceStore<R> {
    counters: Mutex<HashMap<SequenceKey, Arc<Mutex<u64>>>>,
    registry: R,
}

impl<R: InvoiceNumberRegistry> InMemoryInvoiceSequenceStore<R> {
    pub fn new(registry: R) -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            registry,
        }
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    fn counter(&self, key: &SequenceKey) -> Result<Arc<Mutex<u64>>, SequenceError> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|_| SequenceError::Poisoned("sequence table"))?;
        Ok(counters.entry(key.clone()).or_default().clone())
    }
}

impl<R: InvoiceNumberRegistry> InvoiceSequenceStore for InMemoryInvoiceSequenceStore<R> {
    fn allocate(
        &self,
        key: &SequenceKey,
        format: &NumberFormat,
        max_attempts: u32,
    ) -> Result<AllocatedNumber, SequenceError> {
        let counter = self.counter(key)?;
        let mut last = counter
            .lock()
            .map_err(|_| SequenceError::Poisoned("sequence row"))?;

        let (sequence, number, attempts) =
            draw_free_number(key, *last, format, max_attempts, |candidate| self.registry.exists(candidate))?;

        *last = sequence;
        Ok(AllocatedNumber {
            key: key.clone(),
            sequence,
            number,
            attempts,
        })
    }

    fn current(&self, key: &SequenceKey) -> Result<u64, SequenceError> {
        let counter = self.counter(key)?;
        let last = counter
            .lock()
            .map_err(|_| SequenceError::Poisoned("sequence row"))?;
        Ok(*last)
    }
}

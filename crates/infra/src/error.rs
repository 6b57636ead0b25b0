//! Infrastructure error types, one enum per boundary.

use thiserror::Error;

use billing_core::DomainError;

/// Relational store failure (audit log, pivots, beneficiaries).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// Invoice number allocation failure.
#[derive(Debug, Error)]
pub enum SequenceError {
    /// Every candidate within the retry ceiling was already taken.
    #[error("no free invoice number for {key} after {attempts} attempts")]
    Exhausted { key: String, attempts: u32 },

    /// Lock contention or unique-constraint conflict reported by the backend.
    #[error("sequence conflict: {0}")]
    Conflict(String),

    #[error("sequence backend error: {0}")]
    Backend(String),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// Object storage failure.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid object path: {0}")]
    InvalidPath(String),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// PDF rendering / artifact failure.
#[derive(Debug, Error)]
pub enum PdfError {
    #[error("pdf rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Cache backend failure. Callers of `remember` never see it; it only
/// surfaces from direct cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache payload error: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("lock poisoned: {0}")]
    Poisoned(&'static str),
}

/// Failure while generating a complete invoice.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

//! Infrastructure layer: caching, stores, sequences, artifact storage and the
//! invoice generation pipeline.

pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod pdf;
pub mod prorata;
pub mod sequence;
pub mod storage;
pub mod stores;

mod integration_tests;

pub use cache::{InMemoryTaggedCache, TaggedCache};
pub use config::BillingConfig;
pub use error::{CacheError, GenerationError, PdfError, SequenceError, StorageError, StoreError};
pub use generation::{DivisionAccount, FinancerAccount, GeneratedInvoice, InvoiceGenerator};
pub use pdf::{PdfArtifact, PdfArtifactCache, PdfRenderer};
pub use prorata::ProrataService;
pub use sequence::{InvoiceNumberRegistry, InvoiceNumberSequencer, InvoiceSequenceStore};
pub use storage::ObjectStorage;

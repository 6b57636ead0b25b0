//! Invoicing domain module.
//!
//! Business rules of the billing engine: prorata ratios, exact money
//! arithmetic, invoice amounts, draft assembly and invoice number formatting.
//! Pure and deterministic; storage and caching live in `billing-infra`.

pub mod amounts;
pub mod builder;
pub mod item;
pub mod money;
pub mod numbering;
pub mod pivot;
pub mod prorata;

pub use amounts::{InvoiceAmountCalculator, InvoiceAmounts, StaticVatRates, VatRateProvider, DEFAULT_CURRENCY};
pub use builder::{InvoiceBuilder, InvoiceDraft, Recipient};
pub use item::{InvoiceItemDraft, ItemType};
pub use money::Cents;
pub use numbering::{InvoiceType, NumberFormat, DEFAULT_PADDING, DEFAULT_PATTERN, MAX_PADDING};
pub use pivot::{BeneficiaryAssociation, ModulePivot};
pub use prorata::ProrataResult;

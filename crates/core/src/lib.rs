//! `billing-core` : domain foundation building blocks for the billing engine.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, the domain error model, and the billing period value type.

pub mod error;
pub mod id;
pub mod period;
pub mod value_object;

pub use error::{DomainError, DomainResult};
pub use id::{AssociationId, DivisionId, FinancerId, InvoiceId, ModuleId, UserId};
pub use period::BillingPeriod;
pub use value_object::ValueObject;

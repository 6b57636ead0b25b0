//! Pivot associations that carry their own lifecycle.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use billing_core::{AssociationId, BillingPeriod, FinancerId, ModuleId, UserId};

use crate::money::Cents;

/// Financer ↔ user link: the user is a beneficiary between `from` and `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneficiaryAssociation {
    pub id: AssociationId,
    pub financer_id: FinancerId,
    pub user_id: UserId,
    pub active: bool,
    pub from: NaiveDate,
    /// Open-ended when `None`.
    pub to: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl BeneficiaryAssociation {
    /// `active AND from <= period.end AND (to IS NULL OR to >= period.start)`.
    pub fn is_billable_in(&self, period: &BillingPeriod) -> bool {
        self.active
            && self.from <= period.end()
            && self.to.is_none_or(|to| to >= period.start())
    }
}

/// Financer ↔ module link. Its `active` flag is the current snapshot; the
/// audit log holds its history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModulePivot {
    pub id: AssociationId,
    pub financer_id: FinancerId,
    pub module_id: ModuleId,
    pub active: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Negotiated price; falls back to the division price when absent.
    pub price_per_beneficiary: Option<Cents>,
}

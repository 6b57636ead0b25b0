use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billing_core::{DomainError, DomainResult, ModuleId, ValueObject};

use crate::money::Cents;
use crate::prorata::ProrataResult;

/// Kind of billable line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    CorePackage,
    Module,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::CorePackage => "core_package",
            ItemType::Module => "module",
        }
    }
}

/// One billable line, before amounts are computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceItemDraft {
    pub item_type: ItemType,
    pub module_id: Option<ModuleId>,
    /// Price per unit, excluding VAT.
    pub unit_price_htva: Cents,
    pub quantity: i64,
    pub prorata_percentage: Decimal,
    /// How `prorata_percentage` was obtained, when known.
    #[serde(default)]
    pub prorata: Option<ProrataResult>,
}

impl ValueObject for InvoiceItemDraft {}

impl InvoiceItemDraft {
    pub fn core_package(unit_price_htva: Cents, quantity: i64, prorata_percentage: Decimal) -> Self {
        Self {
            item_type: ItemType::CorePackage,
            module_id: None,
            unit_price_htva,
            quantity,
            prorata_percentage,
            prorata: None,
        }
    }

    pub fn module(
        module_id: ModuleId,
        unit_price_htva: Cents,
        quantity: i64,
        prorata_percentage: Decimal,
    ) -> Self {
        Self {
            item_type: ItemType::Module,
            module_id: Some(module_id),
            unit_price_htva,
            quantity,
            prorata_percentage,
            prorata: None,
        }
    }

    pub fn with_prorata(mut self, prorata: ProrataResult) -> Self {
        self.prorata = Some(prorata);
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.unit_price_htva.value() < 0 {
            return Err(DomainError::validation("unit_price_htva must not be negative"));
        }
        if self.quantity < 0 {
            return Err(DomainError::validation("quantity must not be negative"));
        }
        if self.prorata_percentage < Decimal::ZERO || self.prorata_percentage > Decimal::ONE {
            return Err(DomainError::validation(format!(
                "prorata_percentage must be within [0, 1], got {}",
                self.prorata_percentage
            )));
        }
        if self.item_type == ItemType::Module && self.module_id.is_none() {
            return Err(DomainError::validation("module item requires a module_id"));
        }
        Ok(())
    }
}

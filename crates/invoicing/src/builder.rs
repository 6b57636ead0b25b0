//! Fluent assembly of an invoice draft.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use billing_core::{BillingPeriod, DivisionId, DomainError, DomainResult, FinancerId, ModuleId};

use crate::item::InvoiceItemDraft;
use crate::money::Cents;

/// Who the invoice is addressed to.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Recipient {
    Division(DivisionId),
    Financer(FinancerId),
}

/// Immutable, validated invoice draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceDraft {
    recipient: Recipient,
    period: BillingPeriod,
    items: Vec<InvoiceItemDraft>,
}

impl InvoiceDraft {
    pub fn recipient(&self) -> Recipient {
        self.recipient
    }

    pub fn period(&self) -> &BillingPeriod {
        &self.period
    }

    pub fn items(&self) -> &[InvoiceItemDraft] {
        &self.items
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceBuilder {
    recipient: Option<Recipient>,
    period: Option<BillingPeriod>,
    items: Vec<InvoiceItemDraft>,
}

impl InvoiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_division(mut self, division_id: DivisionId) -> Self {
        self.recipient = Some(Recipient::Division(division_id));
        self
    }

    pub fn for_financer(mut self, financer_id: FinancerId) -> Self {
        self.recipient = Some(Recipient::Financer(financer_id));
        self
    }

    pub fn for_period(mut self, period: BillingPeriod) -> Self {
        self.period = Some(period);
        self
    }

    pub fn add_core_package_item(self, unit_price_htva: Cents, quantity: i64, prorata_percentage: Decimal) -> Self {
        self.add_item(InvoiceItemDraft::core_package(unit_price_htva, quantity, prorata_percentage))
    }

    pub fn add_module_item(
        self,
        module_id: ModuleId,
        unit_price_htva: Cents,
        quantity: i64,
        prorata_percentage: Decimal,
    ) -> Self {
        self.add_item(InvoiceItemDraft::module(module_id, unit_price_htva, quantity, prorata_percentage))
    }

    pub fn add_item(mut self, item: InvoiceItemDraft) -> Self {
        self.items.push(item);
        self
    }

    pub fn build(self) -> DomainResult<InvoiceDraft> {
        let recipient = self
            .recipient
            .ok_or_else(|| DomainError::validation("invoice recipient is required"))?;
        let period = self
            .period
            .ok_or_else(|| DomainError::validation("invoice period is required"))?;

        for (idx, item) in self.items.iter().enumerate() {
            item.validate()
                .map_err(|e| DomainError::validation(format!("item {idx}: {e}")))?;
        }

        Ok(InvoiceDraft {
            recipient,
            period,
            items: self.items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemType;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn october() -> BillingPeriod {
        BillingPeriod::new(
            NaiveDate::from_ymd_opt(2025, 10, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
        )
    }

    #[test]
    fn build_keeps_items_in_insertion_order() {
        let division = DivisionId::new();
        let module = ModuleId::new();

        let draft = InvoiceBuilder::new()
            .for_division(division)
            .for_period(october())
            .add_core_package_item(Cents::new(300_000), 12, dec!(1.00))
            .add_module_item(module, Cents::new(1_000), 12, dec!(0.55))
            .build()
            .unwrap();

        assert_eq!(draft.recipient(), Recipient::Division(division));
        assert_eq!(draft.period(), &october());
        assert_eq!(draft.items().len(), 2);
        assert_eq!(draft.items()[0].item_type, ItemType::CorePackage);
        assert_eq!(draft.items()[1].module_id, Some(module));
    }

    #[test]
    fn last_recipient_wins() {
        let financer = FinancerId::new();
        let draft = InvoiceBuilder::new()
            .for_division(DivisionId::new())
            .for_financer(financer)
            .for_period(october())
            .build()
            .unwrap();
        assert_eq!(draft.recipient(), Recipient::Financer(financer));
        assert!(draft.items().is_empty());
    }

    #[test]
    fn missing_recipient_is_a_validation_error() {
        let err = InvoiceBuilder::new().for_period(october()).build().unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn missing_period_is_a_validation_error() {
        let err = InvoiceBuilder::new()
            .for_financer(FinancerId::new())
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn negative_price_is_rejected() {
        let err = InvoiceBuilder::new()
            .for_financer(FinancerId::new())
            .for_period(october())
            .add_core_package_item(Cents::new(-1), 1, Decimal::ONE)
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.starts_with("item 0")));
    }

    #[test]
    fn prorata_above_one_is_rejected() {
        let err = InvoiceBuilder::new()
            .for_division(DivisionId::new())
            .for_period(october())
            .add_core_package_item(Cents::new(100), 1, Decimal::ONE)
            .add_core_package_item(Cents::new(100), 1, Decimal::new(5, 0))
            .build()
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.starts_with("item 1")));
    }
}

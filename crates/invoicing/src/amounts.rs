//! Invoice amounts: subtotal (HTVA), VAT and total (TTC) in minor units.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use billing_core::{DomainError, DomainResult, ValueObject};

use crate::item::InvoiceItemDraft;
use crate::money::{self, Cents};

pub const DEFAULT_CURRENCY: &str = "EUR";

/// Resolves the VAT rate (`0..=1`) that applies to a country.
pub trait VatRateProvider: Send + Sync {
    fn vat_rate(&self, country_code: &str) -> Decimal;
}

impl<P> VatRateProvider for Arc<P>
where
    P: VatRateProvider + ?Sized,
{
    fn vat_rate(&self, country_code: &str) -> Decimal {
        (**self).vat_rate(country_code)
    }
}

impl<P> VatRateProvider for &P
where
    P: VatRateProvider + ?Sized,
{
    fn vat_rate(&self, country_code: &str) -> Decimal {
        (**self).vat_rate(country_code)
    }
}

/// Fixed country → rate table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticVatRates {
    rates: HashMap<String, Decimal>,
    fallback: Option<Decimal>,
}

impl StaticVatRates {
    /// Empty table; every lookup resolves to the fallback (or zero).
    pub fn empty() -> Self {
        Self {
            rates: HashMap::new(),
            fallback: None,
        }
    }

    pub fn with_rate(mut self, country_code: &str, rate: Decimal) -> Self {
        self.rates.insert(country_code.to_ascii_uppercase(), rate);
        self
    }

    pub fn with_fallback(mut self, rate: Decimal) -> Self {
        self.fallback = Some(rate);
        self
    }
}

impl Default for StaticVatRates {
    /// Standard rates of the markets currently billed.
    fn default() -> Self {
        Self::empty()
            .with_rate("FR", Decimal::new(20, 2))
            .with_rate("BE", Decimal::new(21, 2))
            .with_rate("LU", Decimal::new(17, 2))
            .with_rate("NL", Decimal::new(21, 2))
            .with_rate("DE", Decimal::new(19, 2))
    }
}

impl VatRateProvider for StaticVatRates {
    fn vat_rate(&self, country_code: &str) -> Decimal {
        self.rates
            .get(&country_code.trim().to_ascii_uppercase())
            .copied()
            .or(self.fallback)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Monetary result for one item or a whole invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceAmounts {
    pub subtotal_htva: Cents,
    pub vat_amount: Cents,
    /// Always `subtotal_htva + vat_amount`.
    pub total_ttc: Cents,
    pub currency: String,
}

impl ValueObject for InvoiceAmounts {}

impl InvoiceAmounts {
    pub fn zero(currency: impl Into<String>) -> Self {
        Self {
            subtotal_htva: Cents::ZERO,
            vat_amount: Cents::ZERO,
            total_ttc: Cents::ZERO,
            currency: currency.into(),
        }
    }

    /// Component-wise sum.
    pub fn checked_add(&self, other: &InvoiceAmounts) -> DomainResult<InvoiceAmounts> {
        let overflow = || DomainError::invariant("invoice amount overflow");
        Ok(InvoiceAmounts {
            subtotal_htva: self
                .subtotal_htva
                .checked_add(other.subtotal_htva)
                .ok_or_else(overflow)?,
            vat_amount: self.vat_amount.checked_add(other.vat_amount).ok_or_else(overflow)?,
            total_ttc: self.total_ttc.checked_add(other.total_ttc).ok_or_else(overflow)?,
            currency: self.currency.clone(),
        })
    }
}

/// Turns line items into subtotal / VAT / total.
#[derive(Debug, Clone)]
pub struct InvoiceAmountCalculator<V> {
    vat_rates: V,
    currency: String,
}

impl<V: VatRateProvider> InvoiceAmountCalculator<V> {
    pub fn new(vat_rates: V) -> Self {
        Self::with_currency(vat_rates, DEFAULT_CURRENCY)
    }

    pub fn with_currency(vat_rates: V, currency: impl Into<String>) -> Self {
        Self {
            vat_rates,
            currency: currency.into(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn vat_rates(&self) -> &V {
        &self.vat_rates
    }

    /// Amounts of a single item.
    ///
    /// `subtotal = truncate(unit_price × quantity × prorata)`. A zero subtotal
    /// returns zero amounts without looking the VAT rate up.
    pub fn item_amounts(&self, item: &InvoiceItemDraft, country_code: &str) -> DomainResult<InvoiceAmounts> {
        item.validate()?;

        let subtotal = money::prorated_subtotal(item.unit_price_htva, item.quantity, item.prorata_percentage)?;
        if subtotal.is_zero() {
            return Ok(InvoiceAmounts::zero(self.currency.clone()));
        }

        let rate = self.vat_rates.vat_rate(country_code);
        let vat = money::truncate(money::scale(subtotal, rate)?)?;
        let total = subtotal
            .checked_add(vat)
            .ok_or_else(|| DomainError::invariant("invoice amount overflow"))?;

        Ok(InvoiceAmounts {
            subtotal_htva: subtotal,
            vat_amount: vat,
            total_ttc: total,
            currency: self.currency.clone(),
        })
    }

    /// Sum of [`item_amounts`](Self::item_amounts) over `items`.
    pub fn invoice_amounts(&self, items: &[InvoiceItemDraft], country_code: &str) -> DomainResult<InvoiceAmounts> {
        items.iter().try_fold(InvoiceAmounts::zero(self.currency.clone()), |acc, item| {
            acc.checked_add(&self.item_amounts(item, country_code)?)
        })
    }

    /// Same as [`invoice_amounts`](Self::invoice_amounts) for loosely typed
    /// items; an entry that is not a valid item is a type mismatch.
    pub fn invoice_amounts_json(&self, items: &[JsonValue], country_code: &str) -> DomainResult<InvoiceAmounts> {
        let typed = items
            .iter()
            .enumerate()
            .map(|(idx, value)| {
                serde_json::from_value::<InvoiceItemDraft>(value.clone()).map_err(|e| {
                    DomainError::type_mismatch(format!("item {idx} is not an invoice item: {e}"))
                })
            })
            .collect::<DomainResult<Vec<_>>>()?;

        self.invoice_amounts(&typed, country_code)
    }
}

//! Monthly invoice generation for divisions and financers.
//!
//! Ties the pieces together: beneficiary count and ratios, contract and module
//! prorata, price fallbacks, amounts, and number allocation.

use chrono::{Days, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use billing_core::{BillingPeriod, DivisionId, DomainError, DomainResult, FinancerId};
use billing_invoicing::{
    Cents, InvoiceAmountCalculator, InvoiceAmounts, InvoiceBuilder, InvoiceDraft, InvoiceItemDraft, InvoiceType,
    ProrataResult, VatRateProvider, DEFAULT_CURRENCY,
};

use crate::cache::TaggedCache;
use crate::error::GenerationError;
use crate::prorata::ProrataService;
use crate::sequence::{InvoiceNumberRegistry, InvoiceNumberSequencer, InvoiceSequenceStore};
use crate::stores::{AuditLog, BeneficiaryStore, ModulePivotStore};

pub const DEFAULT_COUNTRY: &str = "FR";
pub const PAYMENT_TERM_DAYS: u64 = 30;

/// Billing profile of a division.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DivisionAccount {
    pub id: DivisionId,
    pub country: Option<String>,
    pub currency: Option<String>,
    pub contract_start_date: Option<NaiveDate>,
    pub core_package_price: Option<Cents>,
    pub financer_ids: Vec<FinancerId>,
}

/// Billing profile of a financer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinancerAccount {
    pub id: FinancerId,
    pub division: Option<DivisionAccount>,
    pub contract_start_date: Option<NaiveDate>,
    /// Falls back to the division's price when absent.
    pub core_package_price: Option<Cents>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedInvoice {
    pub invoice_type: InvoiceType,
    pub number: String,
    pub month_year: String,
    pub draft: InvoiceDraft,
    /// Same order as `draft.items()`.
    pub item_amounts: Vec<InvoiceAmounts>,
    pub totals: InvoiceAmounts,
    pub country_code: String,
    pub beneficiaries_count: usize,
    pub due_date: NaiveDate,
}

/// The calendar month named by `YYYY-MM`.
pub fn month_period(month_year: &str) -> DomainResult<BillingPeriod> {
    BillingPeriod::from_month_year(month_year)
}

pub struct InvoiceGenerator<C, B, M, A, S, R, V> {
    prorata: ProrataService<C, B, M, A>,
    sequencer: InvoiceNumberSequencer<S>,
    registry: R,
    vat_rates: V,
}

impl<C, B, M, A, S, R, V> InvoiceGenerator<C, B, M, A, S, R, V>
where
    C: TaggedCache,
    B: BeneficiaryStore,
    M: ModulePivotStore,
    A: AuditLog,
    S: InvoiceSequenceStore,
    R: InvoiceNumberRegistry,
    V: VatRateProvider,
{
    pub fn new(
        prorata: ProrataService<C, B, M, A>,
        sequencer: InvoiceNumberSequencer<S>,
        registry: R,
        vat_rates: V,
    ) -> Self {
        Self {
            prorata,
            sequencer,
            registry,
            vat_rates,
        }
    }

    pub fn prorata(&self) -> &ProrataService<C, B, M, A> {
        &self.prorata
    }

    /// Invoice issued by a division to one of its financers.
    ///
    /// `Ok(None)` when the financer has no billable beneficiary in the month.
    #[instrument(skip(self, financer), fields(financer_id = %financer.id), err)]
    pub fn generate_financer_invoice(
        &self,
        financer: &FinancerAccount,
        month_year: &str,
    ) -> Result<Option<GeneratedInvoice>, GenerationError> {
        let period = month_period(month_year)?;

        let beneficiaries = self.prorata.beneficiaries_count(financer.id, &period)?;
        if beneficiaries == 0 {
            tracing::info!(financer_id = %financer.id, month_year, "no active beneficiaries; skipping invoice");
            return Ok(None);
        }
        let quantity = quantity(beneficiaries)?;

        let division = financer.division.as_ref();
        let core_price = financer
            .core_package_price
            .or(division.and_then(|d| d.core_package_price))
            .unwrap_or(Cents::ZERO);

        let mut builder = InvoiceBuilder::new()
            .for_financer(financer.id)
            .for_period(period)
            .add_item(self.core_package_item(financer.contract_start_date, &period, core_price, quantity));

        let mut pivots = self.prorata.modules().financer_modules(financer.id)?;
        pivots.sort_by_key(|p| p.module_id);
        for pivot in pivots {
            let active = self
                .prorata
                .module_history(financer.id, pivot.module_id)?
                .is_some_and(|history| history.is_active_in_period(&period));
            if !active {
                continue;
            }

            let module_prorata = self.prorata.module_prorata(financer.id, pivot.module_id, &period)?;
            let division_price = match (pivot.price_per_beneficiary, division) {
                (None, Some(d)) => self.prorata.modules().division_module_price(d.id, pivot.module_id)?,
                _ => None,
            };
            let unit_price = pivot
                .price_per_beneficiary
                .or(division_price)
                .unwrap_or(Cents::ZERO);

            builder = builder.add_item(
                InvoiceItemDraft::module(pivot.module_id, unit_price, quantity, module_prorata.percentage)
                    .with_prorata(module_prorata),
            );
        }

        let country = division
            .and_then(|d| d.country.clone())
            .unwrap_or_else(|| DEFAULT_COUNTRY.to_string());
        let currency = division
            .and_then(|d| d.currency.clone())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        self.finish(
            InvoiceType::DivisionToFinancer,
            month_year,
            builder.build()?,
            country,
            currency,
            beneficiaries,
        )
        .map(Some)
    }

    /// Invoice issued by the platform to a division, covering the
    /// beneficiaries of all its financers.
    #[instrument(skip(self, division), fields(division_id = %division.id), err)]
    pub fn generate_division_invoice(
        &self,
        division: &DivisionAccount,
        month_year: &str,
    ) -> Result<GeneratedInvoice, GenerationError> {
        let period = month_period(month_year)?;

        let mut beneficiaries = 0usize;
        for financer_id in &division.financer_ids {
            beneficiaries += self.prorata.beneficiaries_count(*financer_id, &period)?;
        }
        if beneficiaries == 0 {
            return Err(DomainError::validation("cannot generate division invoice without active beneficiaries").into());
        }
        let quantity = quantity(beneficiaries)?;

        let core_price = division.core_package_price.unwrap_or(Cents::ZERO);
        let draft = InvoiceBuilder::new()
            .for_division(division.id)
            .for_period(period)
            .add_item(self.core_package_item(division.contract_start_date, &period, core_price, quantity))
            .build()?;

        self.finish(
            InvoiceType::HexekoToDivision,
            month_year,
            draft,
            division.country.clone().unwrap_or_else(|| DEFAULT_COUNTRY.to_string()),
            division.currency.clone().unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            beneficiaries,
        )
    }

    /// Core package line; a missing contract date bills the full period.
    fn core_package_item(
        &self,
        contract_start_date: Option<NaiveDate>,
        period: &BillingPeriod,
        unit_price: Cents,
        quantity: i64,
    ) -> InvoiceItemDraft {
        match contract_start_date {
            Some(date) => {
                let ratio = self.prorata.contract_prorata(date, period);
                InvoiceItemDraft::core_package(unit_price, quantity, ratio)
                    .with_prorata(ProrataResult::for_contract(date, period))
            }
            None => InvoiceItemDraft::core_package(unit_price, quantity, Decimal::ONE),
        }
    }

    fn finish(
        &self,
        invoice_type: InvoiceType,
        month_year: &str,
        draft: InvoiceDraft,
        country_code: String,
        currency: String,
        beneficiaries_count: usize,
    ) -> Result<GeneratedInvoice, GenerationError> {
        let calculator = InvoiceAmountCalculator::with_currency(&self.vat_rates, currency);
        let item_amounts = draft
            .items()
            .iter()
            .map(|item| calculator.item_amounts(item, &country_code))
            .collect::<DomainResult<Vec<_>>>()?;
        let totals = calculator.invoice_amounts(draft.items(), &country_code)?;

        let period_end = draft.period().end();
        let number = self.sequencer.generate(&invoice_type, period_end)?;
        self.registry.register(&number)?;

        let due_date = period_end
            .checked_add_days(Days::new(PAYMENT_TERM_DAYS))
            .ok_or_else(|| DomainError::invariant("due date out of range"))?;

        tracing::info!(
            %number,
            %invoice_type,
            month_year,
            subtotal_htva = totals.subtotal_htva.value(),
            total_ttc = totals.total_ttc.value(),
            "invoice generated"
        );

        Ok(GeneratedInvoice {
            invoice_type,
            number,
            month_year: month_year.to_string(),
            draft,
            item_amounts,
            totals,
            country_code,
            beneficiaries_count,
            due_date,
        })
    }
}

fn quantity(beneficiaries: usize) -> DomainResult<i64> {
    i64::try_from(beneficiaries).map_err(|_| DomainError::invariant("beneficiary count out of range"))
}

//! Cached prorata service over the pivot and audit stores.

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::instrument;

use billing_audit::ActivationHistory;
use billing_core::{BillingPeriod, FinancerId, ModuleId, UserId};
use billing_invoicing::{prorata, ProrataResult};

use crate::cache::TaggedCache;
use crate::config::ProrataConfig;
use crate::error::{CacheError, StoreError};
use crate::stores::{AuditLog, BeneficiaryStore, ModulePivotStore, FINANCER_MODULE_AUDITABLE};

pub const PRORATA_TAG: &str = "prorata";

pub fn financer_tag(financer_id: FinancerId) -> String {
    format!("financer:{financer_id}")
}

/// Memoizes the pure prorata functions, keyed by every input.
#[derive(Debug, Clone)]
pub struct ProrataService<C, B, M, A> {
    cache: C,
    beneficiaries: B,
    modules: M,
    audit: A,
    ttl: Duration,
}

impl<C, B, M, A> ProrataService<C, B, M, A>
where
    C: TaggedCache,
    B: BeneficiaryStore,
    M: ModulePivotStore,
    A: AuditLog,
{
    pub fn new(cache: C, beneficiaries: B, modules: M, audit: A, config: &ProrataConfig) -> Self {
        Self {
            cache,
            beneficiaries,
            modules,
            audit,
            ttl: config.cache_ttl(),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn modules(&self) -> &M {
        &self.modules
    }

    pub fn contract_prorata(&self, contract_date: NaiveDate, period: &BillingPeriod) -> Decimal {
        let key = format!("prorata:contract:{}:{}:{}", contract_date, period.start(), period.end());
        let tags = [PRORATA_TAG.to_string()];

        self.cache
            .remember(&key, self.ttl, &tags, || {
                Ok::<_, Infallible>(prorata::contract_prorata(contract_date, period))
            })
            .unwrap_or_else(|never| match never {})
    }

    #[instrument(skip(self), fields(financer_id = %financer_id, period = %period), err)]
    pub fn beneficiary_prorata(
        &self,
        financer_id: FinancerId,
        period: &BillingPeriod,
    ) -> Result<BTreeMap<UserId, Decimal>, StoreError> {
        let key = format!("prorata:beneficiaries:{}:{}:{}", financer_id, period.start(), period.end());
        let tags = [PRORATA_TAG.to_string(), financer_tag(financer_id)];

        self.cache.remember(&key, self.ttl, &tags, || {
            let associations = self.beneficiaries.associations(financer_id)?;
            Ok(prorata::beneficiary_prorata(&associations, period))
        })
    }

    /// Number of beneficiaries billable for `period`.
    pub fn beneficiaries_count(&self, financer_id: FinancerId, period: &BillingPeriod) -> Result<usize, StoreError> {
        Ok(self.beneficiary_prorata(financer_id, period)?.len())
    }

    #[instrument(skip(self), fields(financer_id = %financer_id, module_id = %module_id, period = %period), err)]
    pub fn module_prorata(
        &self,
        financer_id: FinancerId,
        module_id: ModuleId,
        period: &BillingPeriod,
    ) -> Result<ProrataResult, StoreError> {
        let key = format!(
            "prorata:module:{}:{}:{}:{}",
            financer_id,
            module_id,
            period.start(),
            period.end()
        );
        let tags = [PRORATA_TAG.to_string(), financer_tag(financer_id)];

        self.cache.remember(&key, self.ttl, &tags, || {
            let history = self.module_history(financer_id, module_id)?;
            Ok(prorata::module_prorata(history.as_ref(), period))
        })
    }

    /// Replayable activation history of a module pivot; `None` when the
    /// financer has no pivot for the module.
    pub fn module_history(
        &self,
        financer_id: FinancerId,
        module_id: ModuleId,
    ) -> Result<Option<ActivationHistory>, StoreError> {
        let Some(pivot) = self.modules.pivot(financer_id, module_id)? else {
            return Ok(None);
        };
        let records = self.audit.records_for(FINANCER_MODULE_AUDITABLE, pivot.id)?;
        Ok(Some(ActivationHistory::from_records(pivot.active, pivot.created_at, &records)))
    }

    /// Evict every cached ratio of one financer.
    pub fn invalidate_financer(&self, financer_id: FinancerId) -> Result<(), CacheError> {
        self.cache.invalidate_tag(&financer_tag(financer_id))
    }
}

//! Read-side store boundaries consumed by the billing services, with
//! in-memory implementations for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use billing_audit::AuditRecord;
use billing_core::{AssociationId, DivisionId, FinancerId, ModuleId};
use billing_invoicing::{BeneficiaryAssociation, Cents, ModulePivot};

use crate::error::StoreError;

/// `auditable_type` of financer ↔ module pivot rows.
pub const FINANCER_MODULE_AUDITABLE: &str = "financer_module";

/// Audit trail of model changes.
pub trait AuditLog: Send + Sync {
    /// Every record for one audited row, in any order.
    fn records_for(&self, auditable_type: &str, auditable_id: AssociationId) -> Result<Vec<AuditRecord>, StoreError>;
}

/// Financer ↔ user associations.
pub trait BeneficiaryStore: Send + Sync {
    fn associations(&self, financer_id: FinancerId) -> Result<Vec<BeneficiaryAssociation>, StoreError>;
}

/// Financer ↔ module pivots and division-level module prices.
pub trait ModulePivotStore: Send + Sync {
    fn financer_modules(&self, financer_id: FinancerId) -> Result<Vec<ModulePivot>, StoreError>;

    fn pivot(&self, financer_id: FinancerId, module_id: ModuleId) -> Result<Option<ModulePivot>, StoreError> {
        Ok(self
            .financer_modules(financer_id)?
            .into_iter()
            .find(|p| p.module_id == module_id))
    }

    /// Price the division negotiated for a module, used when the financer has none.
    fn division_module_price(&self, division_id: DivisionId, module_id: ModuleId) -> Result<Option<Cents>, StoreError>;
}

impl<S> AuditLog for Arc<S>
where
    S: AuditLog + ?Sized,
{
    fn records_for(&self, auditable_type: &str, auditable_id: AssociationId) -> Result<Vec<AuditRecord>, StoreError> {
        (**self).records_for(auditable_type, auditable_id)
    }
}

impl<S> BeneficiaryStore for Arc<S>
where
    S: BeneficiaryStore + ?Sized,
{
    fn associations(&self, financer_id: FinancerId) -> Result<Vec<BeneficiaryAssociation>, StoreError> {
        (**self).associations(financer_id)
    }
}

impl<S> ModulePivotStore for Arc<S>
where
    S: ModulePivotStore + ?Sized,
{
    fn financer_modules(&self, financer_id: FinancerId) -> Result<Vec<ModulePivot>, StoreError> {
        (**self).financer_modules(financer_id)
    }

    fn pivot(&self, financer_id: FinancerId, module_id: ModuleId) -> Result<Option<ModulePivot>, StoreError> {
        (**self).pivot(financer_id, module_id)
    }

    fn division_module_price(&self, division_id: DivisionId, module_id: ModuleId) -> Result<Option<Cents>, StoreError> {
        (**self).division_module_price(division_id, module_id)
    }
}

#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: AuditRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .map_err(|_| StoreError::Poisoned("audit log"))?
            .push(record);
        Ok(())
    }
}

impl AuditLog for InMemoryAuditLog {
    fn records_for(&self, auditable_type: &str, auditable_id: AssociationId) -> Result<Vec<AuditRecord>, StoreError> {
        let records = self
            .records
            .read()
            .map_err(|_| StoreError::Poisoned("audit log"))?;
        Ok(records
            .iter()
            .filter(|r| r.auditable_type() == auditable_type && r.auditable_id() == auditable_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryBeneficiaryStore {
    by_financer: RwLock<HashMap<FinancerId, Vec<BeneficiaryAssociation>>>,
}

impl InMemoryBeneficiaryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, association: BeneficiaryAssociation) -> Result<(), StoreError> {
        self.by_financer
            .write()
            .map_err(|_| StoreError::Poisoned("beneficiary store"))?
            .entry(association.financer_id)
            .or_default()
            .push(association);
        Ok(())
    }
}

impl BeneficiaryStore for InMemoryBeneficiaryStore {
    fn associations(&self, financer_id: FinancerId) -> Result<Vec<BeneficiaryAssociation>, StoreError> {
        let map = self
            .by_financer
            .read()
            .map_err(|_| StoreError::Poisoned("beneficiary store"))?;
        Ok(map.get(&financer_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryModulePivotStore {
    pivots: RwLock<HashMap<FinancerId, Vec<ModulePivot>>>,
    division_prices: RwLock<HashMap<(DivisionId, ModuleId), Cents>>,
}

impl InMemoryModulePivotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the pivot for `(financer_id, module_id)`.
    pub fn upsert(&self, pivot: ModulePivot) -> Result<(), StoreError> {
        let mut pivots = self
            .pivots
            .write()
            .map_err(|_| StoreError::Poisoned("module pivot store"))?;
        let entries = pivots.entry(pivot.financer_id).or_default();
        entries.retain(|p| p.module_id != pivot.module_id);
        entries.push(pivot);
        Ok(())
    }

    pub fn set_division_price(&self, division_id: DivisionId, module_id: ModuleId, price: Cents) -> Result<(), StoreError> {
        self.division_prices
            .write()
            .map_err(|_| StoreError::Poisoned("module pivot store"))?
            .insert((division_id, module_id), price);
        Ok(())
    }
}

impl ModulePivotStore for InMemoryModulePivotStore {
    fn financer_modules(&self, financer_id: FinancerId) -> Result<Vec<ModulePivot>, StoreError> {
        let pivots = self
            .pivots
            .read()
            .map_err(|_| StoreError::Poisoned("module pivot store"))?;
        Ok(pivots.get(&financer_id).cloned().unwrap_or_default())
    }

    fn division_module_price(&self, division_id: DivisionId, module_id: ModuleId) -> Result<Option<Cents>, StoreError> {
        let prices = self
            .division_prices
            .read()
            .map_err(|_| StoreError::Poisoned("module pivot store"))?;
        Ok(prices.get(&(division_id, module_id)).copied())
    }
}

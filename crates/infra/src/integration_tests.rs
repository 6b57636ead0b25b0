//! Integration tests for the full billing pipeline on in-memory backends.
//!
//! Tests: stores → prorata (cached) → builder → amounts → number sequencer,
//! and the PDF artifact cache.
//!
//! Verifies:
//! - Invoice numbers are sequential, padded and skip numbers already in use
//! - Generated invoices carry the expected lines, ratios and amounts
//! - PDF artifacts are served from cache until forced or expired

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    use billing_audit::AuditRecord;
    use billing_core::{AssociationId, DivisionId, DomainError, FinancerId, InvoiceId, ModuleId, UserId};
    use billing_invoicing::{
        BeneficiaryAssociation, Cents, InvoiceType, ItemType, ModulePivot, NumberFormat, Recipient,
        StaticVatRates,
    };

    use crate::cache::InMemoryTaggedCache;
    use crate::config::{BillingConfig, PdfCacheConfig};
    use crate::error::{GenerationError, PdfError};
    use crate::generation::{DivisionAccount, FinancerAccount, InvoiceGenerator};
    use crate::pdf::{PdfArtifactCache, PdfRenderer};
    use crate::prorata::ProrataService;
    use crate::sequence::{
        InMemoryInvoiceNumberRegistry, InMemoryInvoiceSequenceStore, InvoiceNumberRegistry,
        InvoiceNumberSequencer, InvoiceSequenceStore, SequenceKey,
    };
    use crate::storage::{InMemoryObjectStorage, ObjectStorage};
    use crate::stores::{
        InMemoryAuditLog, InMemoryBeneficiaryStore, InMemoryModulePivotStore, FINANCER_MODULE_AUDITABLE,
    };

    type Registry = Arc<InMemoryInvoiceNumberRegistry>;
    type SequenceStore = Arc<InMemoryInvoiceSequenceStore<Registry>>;
    type Generator = InvoiceGenerator<
        Arc<InMemoryTaggedCache>,
        Arc<InMemoryBeneficiaryStore>,
        Arc<InMemoryModulePivotStore>,
        Arc<InMemoryAuditLog>,
        SequenceStore,
        Registry,
        StaticVatRates,
    >;

    struct Harness {
        generator: Generator,
        beneficiaries: Arc<InMemoryBeneficiaryStore>,
        modules: Arc<InMemoryModulePivotStore>,
        audit: Arc<InMemoryAuditLog>,
        registry: Registry,
        sequences: SequenceStore,
    }

    fn harness() -> Harness {
        let _ = billing_observability::init_with_default_filter("billing_infra=debug,warn");

        let config = BillingConfig::default();
        let cache = Arc::new(InMemoryTaggedCache::new());
        let beneficiaries = Arc::new(InMemoryBeneficiaryStore::new());
        let modules = Arc::new(InMemoryModulePivotStore::new());
        let audit = Arc::new(InMemoryAuditLog::new());
        let registry: Registry = Arc::new(InMemoryInvoiceNumberRegistry::new());
        let sequences: SequenceStore = Arc::new(InMemoryInvoiceSequenceStore::new(registry.clone()));

        let prorata = ProrataService::new(
            cache,
            beneficiaries.clone(),
            modules.clone(),
            audit.clone(),
            &config.prorata,
        );
        let sequencer = InvoiceNumberSequencer::from_config(sequences.clone(), &config.numbering);
        let generator = InvoiceGenerator::new(prorata, sequencer, registry.clone(), StaticVatRates::default());

        Harness {
            generator,
            beneficiaries,
            modules,
            audit,
            registry,
            sequences,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_beneficiary(h: &Harness, financer_id: FinancerId, active: bool, from: NaiveDate, to: Option<NaiveDate>) {
        h.beneficiaries
            .insert(BeneficiaryAssociation {
                id: AssociationId::new(),
                financer_id,
                user_id: UserId::new(),
                active,
                from,
                to,
                created_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            })
            .unwrap();
    }

    fn add_module(h: &Harness, financer_id: FinancerId, active: bool, price: Option<Cents>) -> ModulePivot {
        let pivot = ModulePivot {
            id: AssociationId::new(),
            financer_id,
            module_id: ModuleId::new(),
            active,
            created_at: Some(Utc.with_ymd_and_hms(2025, 9, 15, 8, 0, 0).unwrap()),
            price_per_beneficiary: price,
        };
        h.modules.upsert(pivot.clone()).unwrap();
        pivot
    }

    fn division(financer_ids: Vec<FinancerId>) -> DivisionAccount {
        DivisionAccount {
            id: DivisionId::new(),
            country: Some("FR".to_string()),
            currency: None,
            contract_start_date: None,
            core_package_price: Some(Cents::new(1_000)),
            financer_ids,
        }
    }

    /// Three billable beneficiaries (two full month, one 10–20 Oct), a
    /// contract starting 10 Oct and three modules: always on, switched on
    /// 17 Oct, and off all month.
    fn october_financer(h: &Harness) -> (FinancerAccount, ModulePivot, ModulePivot) {
        let financer_id = FinancerId::new();
        add_beneficiary(h, financer_id, true, date(2025, 1, 1), None);
        add_beneficiary(h, financer_id, true, date(2025, 6, 1), None);
        add_beneficiary(h, financer_id, true, date(2025, 10, 10), Some(date(2025, 10, 20)));
        add_beneficiary(h, financer_id, false, date(2025, 1, 1), None);
        add_beneficiary(h, financer_id, true, date(2025, 1, 1), Some(date(2025, 9, 30)));

        let always_on = add_module(h, financer_id, true, Some(Cents::new(500)));
        let switched_on = add_module(h, financer_id, true, None);
        add_module(h, financer_id, false, Some(Cents::new(9_999)));

        h.audit
            .record(AuditRecord::new(
                FINANCER_MODULE_AUDITABLE,
                switched_on.id,
                Some(r#"{"active":false}"#.to_string()),
                Some(r#"{"active":true}"#.to_string()),
                Utc.with_ymd_and_hms(2025, 10, 17, 14, 30, 0).unwrap(),
            ))
            .unwrap();

        let division = division(vec![financer_id]);
        h.modules
            .set_division_price(division.id, switched_on.module_id, Cents::new(200))
            .unwrap();

        let financer = FinancerAccount {
            id: financer_id,
            division: Some(division),
            contract_start_date: Some(date(2025, 10, 10)),
            core_package_price: None,
        };
        (financer, always_on, switched_on)
    }

    #[test]
    fn sequential_numbers_skip_numbers_already_in_use() {
        let registry = Arc::new(InMemoryInvoiceNumberRegistry::new());
        registry.register("HEX-2025-000002").unwrap();
        registry.register("HEX-2025-000003").unwrap();

        let sequencer =
            InvoiceNumberSequencer::new(InMemoryInvoiceSequenceStore::new(registry.clone()), NumberFormat::default(), 100);
        let on = date(2025, 12, 31);

        let numbers: Vec<String> = (0..4)
            .map(|_| sequencer.generate(&InvoiceType::HexekoToDivision, on).unwrap())
            .collect();

        assert_eq!(
            numbers,
            ["HEX-2025-000001", "HEX-2025-000004", "HEX-2025-000005", "HEX-2025-000006"]
        );
        let key = SequenceKey::new(InvoiceType::HexekoToDivision, 2025);
        assert_eq!(sequencer.store().current(&key).unwrap(), 6);

        // A new year starts its own sequence.
        assert_eq!(
            sequencer.generate(&InvoiceType::HexekoToDivision, date(2026, 1, 1)).unwrap(),
            "HEX-2026-000001"
        );
    }

    #[test]
    fn financer_invoice_end_to_end() {
        let h = harness();
        let (financer, always_on, switched_on) = october_financer(&h);

        let invoice = h
            .generator
            .generate_financer_invoice(&financer, "2025-10")
            .unwrap()
            .expect("financer has beneficiaries");

        assert_eq!(invoice.invoice_type, InvoiceType::DivisionToFinancer);
        assert_eq!(invoice.number, "DIV-2025-000001");
        assert_eq!(invoice.due_date, date(2025, 11, 30));
        assert_eq!(invoice.beneficiaries_count, 3);
        assert_eq!(invoice.draft.recipient(), Recipient::Financer(financer.id));
        assert_eq!(invoice.draft.items().len(), 3);
        assert!(h.registry.exists(&invoice.number).unwrap());

        // Core package at the division price, contract from 10 Oct: 22/31.
        let core = &invoice.draft.items()[0];
        assert_eq!(core.item_type, ItemType::CorePackage);
        assert_eq!(core.unit_price_htva, Cents::new(1_000));
        assert_eq!(core.quantity, 3);
        assert_eq!(core.prorata_percentage, dec!(0.71));
        assert_eq!(core.prorata.as_ref().map(|p| p.active_days), Some(22));
        assert_eq!(invoice.item_amounts[0].subtotal_htva, Cents::new(2_130));

        let module_line = |module_id: ModuleId| {
            invoice
                .draft
                .items()
                .iter()
                .position(|i| i.module_id == Some(module_id))
                .expect("module line present")
        };

        let full = module_line(always_on.module_id);
        assert_eq!(invoice.draft.items()[full].prorata_percentage, Decimal::ONE);
        assert_eq!(invoice.item_amounts[full].subtotal_htva, Cents::new(1_500));

        // Division price fallback, active 17–31 Oct: 15/31.
        let partial = module_line(switched_on.module_id);
        assert_eq!(invoice.draft.items()[partial].unit_price_htva, Cents::new(200));
        assert_eq!(invoice.draft.items()[partial].prorata_percentage, dec!(0.48));
        assert_eq!(invoice.item_amounts[partial].subtotal_htva, Cents::new(288));
        assert_eq!(invoice.item_amounts[partial].vat_amount, Cents::new(57));

        assert_eq!(invoice.totals.subtotal_htva, Cents::new(3_918));
        assert_eq!(invoice.totals.vat_amount, Cents::new(426 + 300 + 57));
        assert_eq!(invoice.totals.total_ttc, Cents::new(3_918 + 783));
        assert_eq!(invoice.totals.currency, "EUR");

        let second = h
            .generator
            .generate_financer_invoice(&financer, "2025-10")
            .unwrap()
            .unwrap();
        assert_eq!(second.number, "DIV-2025-000002");
    }

    #[test]
    fn financer_without_beneficiaries_gets_no_invoice() {
        let h = harness();
        let financer = FinancerAccount {
            id: FinancerId::new(),
            division: None,
            contract_start_date: None,
            core_package_price: Some(Cents::new(1_000)),
        };

        assert_eq!(h.generator.generate_financer_invoice(&financer, "2025-10").unwrap(), None);

        let key = SequenceKey::new(InvoiceType::DivisionToFinancer, 2025);
        assert_eq!(h.sequences.current(&key).unwrap(), 0);
    }

    #[test]
    fn division_invoice_sums_beneficiaries_of_all_financers() {
        let h = harness();
        let busy = FinancerId::new();
        let idle = FinancerId::new();
        for _ in 0..3 {
            add_beneficiary(&h, busy, true, date(2025, 1, 1), None);
        }

        let mut division = division(vec![busy, idle]);
        division.country = Some("BE".to_string());
        division.core_package_price = Some(Cents::new(300_000));

        let invoice = h.generator.generate_division_invoice(&division, "2025-10").unwrap();

        assert_eq!(invoice.number, "HEX-2025-000001");
        assert_eq!(invoice.draft.recipient(), Recipient::Division(division.id));
        assert_eq!(invoice.beneficiaries_count, 3);
        assert_eq!(invoice.draft.items().len(), 1);
        assert_eq!(invoice.totals.subtotal_htva, Cents::new(900_000));
        assert_eq!(invoice.totals.vat_amount, Cents::new(189_000));
        assert_eq!(invoice.totals.total_ttc, Cents::new(1_089_000));
        assert_eq!(invoice.country_code, "BE");
    }

    #[test]
    fn division_without_beneficiaries_is_rejected() {
        let h = harness();
        let division = division(vec![FinancerId::new()]);

        let err = h.generator.generate_division_invoice(&division, "2025-10").unwrap_err();
        assert!(matches!(err, GenerationError::Domain(DomainError::Validation(_))));
    }

    #[test]
    fn malformed_month_is_rejected() {
        let h = harness();
        let division = division(vec![]);
        for bad in ["2025-13", "10-2025", "2025/10", ""] {
            let err = h.generator.generate_division_invoice(&division, bad).unwrap_err();
            assert!(matches!(err, GenerationError::Domain(DomainError::Validation(_))), "{bad}");
        }
    }

    #[test]
    fn beneficiary_changes_show_after_financer_invalidation() {
        let h = harness();
        let financer_id = FinancerId::new();
        add_beneficiary(&h, financer_id, true, date(2025, 1, 1), None);
        let financer = FinancerAccount {
            id: financer_id,
            division: None,
            contract_start_date: None,
            core_package_price: Some(Cents::new(1_000)),
        };

        let first = h.generator.generate_financer_invoice(&financer, "2025-10").unwrap().unwrap();
        assert_eq!(first.draft.items()[0].quantity, 1);

        add_beneficiary(&h, financer_id, true, date(2025, 1, 1), None);
        let cached = h.generator.generate_financer_invoice(&financer, "2025-10").unwrap().unwrap();
        assert_eq!(cached.draft.items()[0].quantity, 1);

        h.generator.prorata().invalidate_financer(financer_id).unwrap();
        let refreshed = h.generator.generate_financer_invoice(&financer, "2025-10").unwrap().unwrap();
        assert_eq!(refreshed.draft.items()[0].quantity, 2);
    }

    struct StaticRenderer;

    impl PdfRenderer for StaticRenderer {
        fn render(&self, invoice_id: InvoiceId) -> Result<Vec<u8>, PdfError> {
            Ok(format!("%PDF-1.7 invoice {invoice_id} rendered {}", Utc::now().timestamp_nanos_opt().unwrap_or(0))
                .into_bytes())
        }
    }

    #[test]
    fn pdf_cache_miss_then_hit_then_forced_regeneration() {
        let storage = Arc::new(InMemoryObjectStorage::new());
        let cache = PdfArtifactCache::new(storage.clone(), StaticRenderer, PdfCacheConfig::default());
        let invoice_id = InvoiceId::new();

        let first = cache.get(invoice_id, false).unwrap();
        assert!(!first.from_cache);
        assert_eq!(first.path, format!("invoices/{invoice_id}.pdf"));
        assert!(storage.exists(&cache.sidecar_path(invoice_id)).unwrap());

        let second = cache.get(invoice_id, false).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.bytes, first.bytes);

        let forced = cache.get(invoice_id, true).unwrap();
        assert!(!forced.from_cache);
    }
}

//! Day-based prorata ratios.
//!
//! A ratio is `active days / period days`, both counted inclusively, computed
//! with six fractional digits, rounded to two (half away from zero) and
//! clamped to `[0, 1]`.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use billing_audit::ActivationHistory;
use billing_core::period::inclusive_days;
use billing_core::{BillingPeriod, UserId, ValueObject};

use crate::pivot::BeneficiaryAssociation;

const INTERMEDIATE_SCALE: u32 = 6;
const RATIO_SCALE: u32 = 2;

/// Outcome of prorating one association over a billing period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProrataResult {
    /// In `[0, 1]`, two decimals.
    pub percentage: Decimal,
    pub active_days: i64,
    pub total_days: i64,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub activation_date: Option<NaiveDate>,
    pub deactivation_date: Option<NaiveDate>,
}

impl ValueObject for ProrataResult {}

impl ProrataResult {
    /// Nothing billable in `period`.
    pub fn zero(period: &BillingPeriod) -> Self {
        Self {
            percentage: Decimal::ZERO,
            active_days: 0,
            total_days: period.length_in_days(),
            period_start: period.start(),
            period_end: period.end(),
            activation_date: None,
            deactivation_date: None,
        }
    }

    fn zero_with_dates(
        period: &BillingPeriod,
        activation_date: Option<NaiveDate>,
        deactivation_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            activation_date,
            deactivation_date,
            ..Self::zero(period)
        }
    }

    /// Contract-level detail: the contract runs from `contract_date` onwards.
    pub fn for_contract(contract_date: NaiveDate, period: &BillingPeriod) -> Self {
        let start = contract_date.max(period.start());
        let active_days = if period.length_in_days() == 0 || start > period.end() {
            0
        } else {
            inclusive_days(start, period.end())
        };

        Self {
            percentage: contract_prorata(contract_date, period),
            active_days,
            total_days: period.length_in_days(),
            period_start: period.start(),
            period_end: period.end(),
            activation_date: Some(start),
            deactivation_date: None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.percentage.is_zero()
    }
}

/// `numerator / denominator` as a billing ratio.
///
/// `0` when `denominator <= 0`; otherwise truncated to six decimals, rounded to
/// two, clamped to `[0, 1]`.
pub fn ratio(numerator: i64, denominator: i64) -> Decimal {
    if denominator <= 0 {
        return Decimal::ZERO;
    }

    let Some(exact) = Decimal::from(numerator).checked_div(Decimal::from(denominator)) else {
        return Decimal::ZERO;
    };

    exact
        .round_dp_with_strategy(INTERMEDIATE_SCALE, RoundingStrategy::ToZero)
        .round_dp_with_strategy(RATIO_SCALE, RoundingStrategy::MidpointAwayFromZero)
        .clamp(Decimal::ZERO, Decimal::ONE)
}

/// Share of `period` covered by a contract starting on `contract_date`.
pub fn contract_prorata(contract_date: NaiveDate, period: &BillingPeriod) -> Decimal {
    if contract_date <= period.start() {
        return Decimal::ONE;
    }
    if contract_date > period.end() {
        return Decimal::ZERO;
    }

    let active_days = inclusive_days(contract_date.max(period.start()), period.end());
    ratio(active_days, period.length_in_days())
}

/// Per-beneficiary ratios for the associations billable in `period`, keyed
/// (and therefore ordered) by user.
pub fn beneficiary_prorata<'a>(
    associations: impl IntoIterator<Item = &'a BeneficiaryAssociation>,
    period: &BillingPeriod,
) -> BTreeMap<UserId, Decimal> {
    let total_days = period.length_in_days();
    if total_days == 0 {
        return BTreeMap::new();
    }

    associations
        .into_iter()
        .filter(|a| a.is_billable_in(period))
        .filter_map(|a| {
            let start = a.from.max(period.start());
            let end = a.to.map_or(period.end(), |to| to.min(period.end()));
            if start > end {
                return None;
            }
            Some((a.user_id, ratio(inclusive_days(start, end), total_days)))
        })
        .collect()
}

/// Prorata of a module over `period`, replayed from the pivot's activation
/// history. `None` means the financer has no pivot for the module.
pub fn module_prorata(history: Option<&ActivationHistory>, period: &BillingPeriod) -> ProrataResult {
    let Some(history) = history else {
        return ProrataResult::zero(period);
    };

    let activation = history.resolve_activation_date(period);
    let deactivation = history.resolve_deactivation_date(period);

    let effective_start = match activation {
        Some(date) => date.max(period.start()),
        None if history.current_active() => period.start(),
        None => return ProrataResult::zero_with_dates(period, activation, deactivation),
    };
    let effective_end = deactivation.map_or(period.end(), |date| date.min(period.end()));

    if effective_start > effective_end {
        return ProrataResult::zero_with_dates(period, activation, deactivation);
    }

    let total_days = period.length_in_days();
    let active_days = inclusive_days(effective_start, effective_end);

    ProrataResult {
        percentage: ratio(active_days, total_days),
        active_days,
        total_days,
        period_start: period.start(),
        period_end: period.end(),
        activation_date: Some(effective_start),
        deactivation_date: if effective_end == period.end() && deactivation.is_none() {
            None
        } else {
            Some(effective_end)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use billing_audit::AuditEvent;
    use billing_core::{AssociationId, FinancerId};
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ts(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
    }

    fn october() -> BillingPeriod {
        BillingPeriod::new(date(2025, 10, 1), date(2025, 10, 31))
    }

    fn association(user_id: UserId, from: NaiveDate, to: Option<NaiveDate>) -> BeneficiaryAssociation {
        BeneficiaryAssociation {
            id: AssociationId::new(),
            financer_id: FinancerId::new(),
            user_id,
            active: true,
            from,
            to,
            created_at: ts(2025, 1, 1),
        }
    }

    #[test]
    fn ratio_of_zero_or_negative_denominator_is_zero() {
        assert_eq!(ratio(10, 0), Decimal::ZERO);
        assert_eq!(ratio(10, -3), Decimal::ZERO);
    }

    #[test]
    fn ratio_rounds_to_two_decimals_and_clamps() {
        assert_eq!(ratio(11, 31), dec!(0.35));
        assert_eq!(ratio(12, 31), dec!(0.39));
        assert_eq!(ratio(17, 31), dec!(0.55));
        assert_eq!(ratio(1, 8), dec!(0.13)); // 0.125 rounds away from zero
        assert_eq!(ratio(45, 31), Decimal::ONE);
        assert_eq!(ratio(-5, 31), Decimal::ZERO);
    }

    #[test]
    fn contract_starting_on_period_start_is_full_and_after_end_is_nothing() {
        let period = october();
        assert_eq!(contract_prorata(date(2025, 10, 1), &period), Decimal::ONE);
        assert_eq!(contract_prorata(date(2025, 11, 1), &period), Decimal::ZERO);
        assert_eq!(contract_prorata(date(2025, 10, 20), &period), dec!(0.39));
    }

    #[test]
    fn contract_detail_reports_days_from_the_contract_start() {
        let result = ProrataResult::for_contract(date(2025, 10, 20), &october());
        assert_eq!(result.active_days, 12);
        assert_eq!(result.total_days, 31);
        assert_eq!(result.activation_date, Some(date(2025, 10, 20)));

        let before = ProrataResult::for_contract(date(2024, 3, 1), &october());
        assert_eq!(before.percentage, Decimal::ONE);
        assert_eq!(before.activation_date, Some(date(2025, 10, 1)));
    }

    #[test]
    fn beneficiary_window_inside_period() {
        let user = UserId::new();
        let rows = [association(user, date(2025, 10, 10), Some(date(2025, 10, 20)))];
        let ratios = beneficiary_prorata(&rows, &october());
        assert_eq!(ratios.get(&user), Some(&dec!(0.35)));
    }

    #[test]
    fn beneficiaries_outside_or_inactive_are_skipped() {
        let before = association(UserId::new(), date(2025, 8, 1), Some(date(2025, 9, 30)));
        let after = association(UserId::new(), date(2025, 11, 1), None);
        let mut inactive = association(UserId::new(), date(2025, 1, 1), None);
        inactive.active = false;
        let open_ended = association(UserId::new(), date(2025, 1, 1), None);

        let rows = [before, after, inactive, open_ended.clone()];
        let ratios = beneficiary_prorata(&rows, &october());
        assert_eq!(ratios.len(), 1);
        assert_eq!(ratios.get(&open_ended.user_id), Some(&Decimal::ONE));
    }

    #[test]
    fn beneficiary_results_are_ordered_by_user() {
        let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();
        let rows: Vec<_> = users
            .iter()
            .rev()
            .map(|u| association(*u, date(2025, 10, 1), None))
            .collect();
        let keys: Vec<UserId> = beneficiary_prorata(&rows, &october()).into_keys().collect();
        let mut sorted = users.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn inverted_period_yields_no_beneficiaries() {
        let rows = [association(UserId::new(), date(2025, 1, 1), None)];
        let period = BillingPeriod::new(date(2025, 10, 31), date(2025, 10, 1));
        assert!(beneficiary_prorata(&rows, &period).is_empty());
    }

    #[test]
    fn missing_pivot_is_a_zero_result() {
        let result = module_prorata(None, &october());
        assert_eq!(result, ProrataResult::zero(&october()));
        assert_eq!(result.total_days, 31);
    }

    #[test]
    fn module_created_before_period_is_billed_in_full() {
        let history = ActivationHistory::new(true, Some(ts(2025, 9, 15)), vec![]);
        let result = module_prorata(Some(&history), &october());

        assert_eq!(result.activation_date, Some(date(2025, 10, 1)));
        assert_eq!(result.deactivation_date, None);
        assert_eq!(result.active_days, 31);
        assert_eq!(result.percentage, dec!(1.00));
    }

    #[test]
    fn module_activated_mid_period() {
        let history = ActivationHistory::new(
            true,
            Some(ts(2025, 10, 1)),
            vec![AuditEvent::active_change(ts(2025, 10, 15), false, true)],
        );
        let result = module_prorata(Some(&history), &october());

        assert_eq!(result.activation_date, Some(date(2025, 10, 15)));
        assert_eq!(result.active_days, 17);
        assert_eq!(result.percentage, dec!(0.55));
        assert_eq!(result.deactivation_date, None);
    }

    #[test]
    fn module_deactivated_mid_period_reports_the_end_date() {
        let history = ActivationHistory::new(
            false,
            Some(ts(2025, 1, 1)),
            vec![AuditEvent::active_change(ts(2025, 10, 10), true, false)],
        );
        let result = module_prorata(Some(&history), &october());

        assert_eq!(result.activation_date, Some(date(2025, 10, 1)));
        assert_eq!(result.deactivation_date, Some(date(2025, 10, 10)));
        assert_eq!(result.active_days, 10);
        assert_eq!(result.percentage, dec!(0.32));
    }

    #[test]
    fn inactive_module_without_activation_evidence_echoes_dates() {
        let history = ActivationHistory::new(
            false,
            Some(ts(2025, 10, 5)),
            vec![AuditEvent::active_change(ts(2025, 10, 12), true, false)],
        );
        let result = module_prorata(Some(&history), &october());

        assert!(result.is_zero());
        assert_eq!(result.active_days, 0);
        assert_eq!(result.total_days, 31);
        assert_eq!(result.activation_date, None);
        assert_eq!(result.deactivation_date, Some(date(2025, 10, 12)));
    }

    #[test]
    fn deactivation_before_activation_is_zero() {
        let history = ActivationHistory::new(
            true,
            Some(ts(2025, 10, 2)),
            vec![
                AuditEvent::active_change(ts(2025, 10, 5), true, false),
                AuditEvent::active_change(ts(2025, 10, 20), false, true),
            ],
        );
        let result = module_prorata(Some(&history), &october());

        assert!(result.is_zero());
        assert_eq!(result.activation_date, Some(date(2025, 10, 20)));
        assert_eq!(result.deactivation_date, Some(date(2025, 10, 5)));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: every ratio lies in [0, 1] with at most two decimals.
        #[test]
        fn ratio_is_bounded(numerator in -1_000i64..1_000, denominator in -10i64..400) {
            let r = ratio(numerator, denominator);
            prop_assert!(r >= Decimal::ZERO && r <= Decimal::ONE);
            prop_assert!(r.scale() <= 2);
        }

        /// Property: beneficiary active days never exceed the period.
        #[test]
        fn beneficiary_ratio_is_bounded(from_offset in -60i64..60, len in 0i64..90) {
            let from = date(2025, 10, 1) + chrono::Duration::days(from_offset);
            let to = from + chrono::Duration::days(len);
            let user = UserId::new();
            let rows = [association(user, from, Some(to))];
            for r in beneficiary_prorata(&rows, &october()).values() {
                prop_assert!(*r > Decimal::ZERO && *r <= Decimal::ONE);
            }
        }
    }
}

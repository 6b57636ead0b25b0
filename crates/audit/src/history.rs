//! Activation history replay.
//!
//! An [`ActivationHistory`] is the ordered list of audit events for one pivot
//! association plus what is needed to seed a replay: the association's current
//! `active` flag and its creation timestamp. Every query is a pure fold over
//! the events; there is no snapshotting, so each query is O(n).

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use billing_core::{BillingPeriod, ValueObject};

use crate::event::{ActivationChange, AuditEvent, ACTIVE_FIELD};
use crate::record::AuditRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationHistory {
    /// Current snapshot of the association's `active` flag.
    current_active: bool,
    /// When the association was created, if known.
    created_at: Option<DateTime<Utc>>,
    /// Events sorted by `occurred_at` ascending (stable for equal timestamps).
    events: Vec<AuditEvent>,
}

impl ValueObject for ActivationHistory {}

impl ActivationHistory {
    pub fn new(
        current_active: bool,
        created_at: Option<DateTime<Utc>>,
        mut events: Vec<AuditEvent>,
    ) -> Self {
        events.sort_by_key(AuditEvent::occurred_at);
        Self {
            current_active,
            created_at,
            events,
        }
    }

    /// Build a history from raw audit rows, decoding each payload.
    pub fn from_records<'a>(
        current_active: bool,
        created_at: Option<DateTime<Utc>>,
        records: impl IntoIterator<Item = &'a AuditRecord>,
    ) -> Self {
        Self::new(
            current_active,
            created_at,
            records.into_iter().map(AuditRecord::decode).collect(),
        )
    }

    pub fn current_active(&self) -> bool {
        self.current_active
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Events whose timestamp falls inside the whole-day window of `period`.
    pub fn events_within(&self, period: &BillingPeriod) -> impl DoubleEndedIterator<Item = &AuditEvent> {
        let from = period.start_of_day();
        let to = period.end_of_day();
        self.events
            .iter()
            .filter(move |e| e.occurred_at() >= from && e.occurred_at() <= to)
    }

    /// State before the first recorded event.
    ///
    /// The first event's old `active` value when it has one, otherwise the
    /// association's current flag.
    pub fn initial_state(&self) -> bool {
        self.events
            .first()
            .and_then(|e| e.old_flag(ACTIVE_FIELD))
            .unwrap_or(self.current_active)
    }

    /// Date of the first activation inside `window`.
    ///
    /// Without an activation event, an association created on or before the
    /// window start (or with no known creation time) counts as already active
    /// and resolves to the window start. Otherwise the date is unknown.
    pub fn resolve_activation_date(&self, window: &BillingPeriod) -> Option<NaiveDate> {
        let activated = self
            .events_within(window)
            .find(|e| e.determine_change() == ActivationChange::Activated)
            .map(|e| e.occurred_at().date_naive());

        if activated.is_some() {
            return activated;
        }

        let already_active = self
            .created_at
            .is_none_or(|created| created <= window.start_of_day());

        already_active.then(|| window.start())
    }

    /// Date of the last deactivation inside `window`, scanning newest first.
    pub fn resolve_deactivation_date(&self, window: &BillingPeriod) -> Option<NaiveDate> {
        self.events_within(window)
            .rev()
            .find(|e| e.determine_change() == ActivationChange::Deactivated)
            .map(|e| e.occurred_at().date_naive())
    }

    /// Point-in-time projection of the `active` flag.
    ///
    /// Starts from [`initial_state`](Self::initial_state) and folds every event
    /// at or before `target` in ascending order; an event changes the state
    /// whenever its new values carry a boolean `active`.
    pub fn is_active_at(&self, target: DateTime<Utc>) -> bool {
        self.events
            .iter()
            .take_while(|e| e.occurred_at() <= target)
            .fold(self.initial_state(), |state, e| {
                e.new_flag(ACTIVE_FIELD).unwrap_or(state)
            })
    }

    /// State at the end of `date` (23:59:59 UTC).
    pub fn is_active_on(&self, date: NaiveDate) -> bool {
        let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        self.is_active_at(Utc.from_utc_datetime(&date.and_time(last)))
    }

    /// Whether the association was active at any point of `period`.
    ///
    /// True when it was active as the period opened or when the `active` flag
    /// was set to `true` by any event inside the period.
    pub fn is_active_in_period(&self, period: &BillingPeriod) -> bool {
        if period.length_in_days() == 0 {
            return false;
        }
        // state just before the period opens
        let opening = self
            .events
            .iter()
            .take_while(|e| e.occurred_at() < period.start_of_day())
            .fold(self.initial_state(), |state, e| {
                e.new_flag(ACTIVE_FIELD).unwrap_or(state)
            });

        opening
            || self
                .events_within(period)
                .any(|e| e.new_flag(ACTIVE_FIELD) == Some(true))
    }
}

//! Billing period: an inclusive calendar-date range used as the prorata denominator.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::value_object::ValueObject;

/// Inclusive date range `[start, end]`.
///
/// A period whose start lies after its end is representable on purpose: its
/// length is `0` and every ratio computed against it is `0`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BillingPeriod {
    start: NaiveDate,
    end: NaiveDate,
}

impl ValueObject for BillingPeriod {}

impl BillingPeriod {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// The full calendar month containing `year`/`month`.
    pub fn month(year: i32, month: u32) -> DomainResult<Self> {
        let start = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| DomainError::validation(format!("invalid month: {year}-{month:02}")))?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)
        }
        .ok_or_else(|| DomainError::validation(format!("invalid month: {year}-{month:02}")))?;
        let end = next
            .pred_opt()
            .ok_or_else(|| DomainError::validation(format!("invalid month: {year}-{month:02}")))?;
        Ok(Self { start, end })
    }

    /// Parse a `YYYY-MM` month-year string into the calendar month it names.
    pub fn from_month_year(month_year: &str) -> DomainResult<Self> {
        let invalid = || DomainError::validation(format!("invalid month-year format: {month_year}"));

        let (year, month) = month_year.trim().split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        Self::month(year, month).map_err(|_| invalid())
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Number of days in the period, both boundaries included; `0` when `start > end`.
    pub fn length_in_days(&self) -> i64 {
        if self.start > self.end {
            return 0;
        }
        inclusive_days(self.start, self.end)
    }

    /// First instant of the start day (UTC).
    pub fn start_of_day(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// Last representable second of the end day (UTC).
    pub fn end_of_day(&self) -> DateTime<Utc> {
        let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
        Utc.from_utc_datetime(&self.end.and_time(last))
    }
}

impl core::fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Days between `start` and `end` plus one: both boundary days count.
///
/// `inclusive_days(d, d) == 1`. Callers order their arguments; the result is
/// not meaningful for `start > end`.
pub fn inclusive_days(start: NaiveDate, end: NaiveDate) -> i64 {
    end.signed_duration_since(start).num_days() + 1
}

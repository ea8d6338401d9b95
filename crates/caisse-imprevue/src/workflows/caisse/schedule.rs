//! Due-date arithmetic for contribution schedules.
//!
//! Every period is anchored on the first payment date: period `k` (1-based) is due on
//! `first + (k - 1) months`. Month arithmetic is calendar based and clamps the day of month,
//! so a schedule starting on 31 January is due on 29 February in a leap year and back on
//! 31 March afterwards. Dates are always derived from the anchor, never chained.

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use super::domain::{Contract, ContractStatus, PaymentFrequency};
use super::policy::GracePolicy;

/// Lateness of a contribution relative to its due date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentClassification {
    OnTime,
    Penalized,
    /// Not credited to its original month; regularity benefits are lost for the period.
    Forfeited,
}

impl PaymentClassification {
    pub const fn label(self) -> &'static str {
        match self {
            Self::OnTime => "ON_TIME",
            Self::Penalized => "PENALIZED",
            Self::Forfeited => "FORFEITED",
        }
    }

    pub const fn is_late(self) -> bool {
        !matches!(self, Self::OnTime)
    }
}

/// A single scheduled contribution period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledPeriod {
    pub index: u32,
    pub due_date: NaiveDate,
    pub next_due_date: NaiveDate,
}

impl ScheduledPeriod {
    fn at(first_payment_date: NaiveDate, zero_based: u32) -> Self {
        Self {
            index: zero_based + 1,
            due_date: shift_months(first_payment_date, zero_based),
            next_due_date: shift_months(first_payment_date, zero_based + 1),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.due_date <= date && date < self.next_due_date
    }
}

/// Adds calendar months, saturating at `NaiveDate::MAX`.
pub fn shift_months(date: NaiveDate, months: u32) -> NaiveDate {
    date.checked_add_months(Months::new(months))
        .unwrap_or(NaiveDate::MAX)
}

pub fn contract_end_date(first_payment_date: NaiveDate, duration_in_months: u32) -> NaiveDate {
    shift_months(first_payment_date, duration_in_months)
}

pub fn monthly_due_dates(first_payment_date: NaiveDate, duration_in_months: u32) -> Vec<NaiveDate> {
    (0..duration_in_months)
        .map(|offset| shift_months(first_payment_date, offset))
        .collect()
}

pub fn periods(first_payment_date: NaiveDate, duration_in_months: u32) -> Vec<ScheduledPeriod> {
    (0..duration_in_months)
        .map(|offset| ScheduledPeriod::at(first_payment_date, offset))
        .collect()
}

/// Number of whole periods elapsed since the first payment date.
///
/// Zero before the first payment and during the first period; exactly `n` on
/// `first + n months`.
pub fn elapsed_periods(first_payment_date: NaiveDate, as_of: NaiveDate) -> u32 {
    if as_of < first_payment_date {
        return 0;
    }

    let months = (as_of.year() - first_payment_date.year()) * 12 + as_of.month() as i32
        - first_payment_date.month() as i32;
    let mut elapsed = months.max(0) as u32;
    if elapsed > 0 && shift_months(first_payment_date, elapsed) > as_of {
        elapsed -= 1;
    }
    elapsed
}

/// The scheduled period containing `as_of`, if the contract term covers it.
pub fn current_period(
    first_payment_date: NaiveDate,
    duration_in_months: u32,
    as_of: NaiveDate,
) -> Option<ScheduledPeriod> {
    if as_of < first_payment_date {
        return None;
    }
    let elapsed = elapsed_periods(first_payment_date, as_of);
    (elapsed < duration_in_months).then(|| ScheduledPeriod::at(first_payment_date, elapsed))
}

/// Maps the period date supplied with a payment onto its scheduled period.
pub fn period_for_date(
    first_payment_date: NaiveDate,
    duration_in_months: u32,
    date: NaiveDate,
) -> Option<ScheduledPeriod> {
    current_period(first_payment_date, duration_in_months, date)
}

/// First scheduled contribution strictly after `as_of`, or the end date once the last period
/// has started.
pub fn next_due_date_after(
    first_payment_date: NaiveDate,
    duration_in_months: u32,
    as_of: NaiveDate,
) -> NaiveDate {
    if as_of < first_payment_date {
        return first_payment_date;
    }
    let upcoming = (elapsed_periods(first_payment_date, as_of) + 1).min(duration_in_months);
    shift_months(first_payment_date, upcoming)
}

pub fn classify(
    due_date: NaiveDate,
    today: NaiveDate,
    grace: &GracePolicy,
) -> PaymentClassification {
    let days_late = (today - due_date).num_days();
    if days_late <= grace.grace_days {
        PaymentClassification::OnTime
    } else if days_late <= grace.penalty_days {
        PaymentClassification::Penalized
    } else {
        PaymentClassification::Forfeited
    }
}

/// Whether the contract expects a contribution in the given calendar month.
///
/// Daily contracts accrue continuously, so they are due in every month of the term while the
/// contract is active. Contracts without a first payment date are never due.
pub fn is_due_in_month(contract: &Contract, year: i32, month: u32) -> bool {
    let Some(first) = contract.first_payment_date else {
        return false;
    };
    if !(1..=12).contains(&month) {
        return false;
    }
    let duration = contract.subscription_tier.duration_in_months;

    match contract.payment_frequency {
        PaymentFrequency::Monthly => monthly_due_dates(first, duration)
            .iter()
            .any(|due| due.year() == year && due.month() == month),
        PaymentFrequency::Daily => {
            if contract.status != ContractStatus::Active {
                return false;
            }
            let end = contract_end_date(first, duration);
            let target = month_ordinal(year, month);
            month_ordinal(first.year(), first.month()) <= target
                && target <= month_ordinal(end.year(), end.month())
        }
    }
}

fn month_ordinal(year: i32, month: u32) -> i64 {
    i64::from(year) * 12 + i64::from(month)
}

/// Membership year (0-based) containing `as_of`, with its first and last-exclusive dates.
pub fn membership_year(
    first_payment_date: NaiveDate,
    as_of: NaiveDate,
    periods_per_year: u32,
) -> (u32, NaiveDate, NaiveDate) {
    let periods_per_year = periods_per_year.max(1);
    let year = elapsed_periods(first_payment_date, as_of) / periods_per_year;
    let starts_on = shift_months(first_payment_date, year * periods_per_year);
    let ends_on = shift_months(first_payment_date, (year + 1) * periods_per_year);
    (year, starts_on, ends_on)
}

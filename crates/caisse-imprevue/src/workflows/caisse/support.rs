//! Support (appui) eligibility, disbursement bookkeeping and repayment tracking.
//!
//! The engine only records decisions on the contract; it never moves money. Forced offsets
//! against the accrued nominal require an explicit [`OffsetAuthorization`].

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::contracts::lifecycle::require_activated;
use super::domain::{
    ActorId, Contract, ContractStatus, SupportId, SupportRecord, SupportSettlement,
};
use super::error::{CaisseError, ContributionGap, ValidationError};
use super::policy::{CaissePolicy, GracePolicy, SupportPolicy};
use super::schedule::{self, PaymentClassification, ScheduledPeriod};

const ENTITY: &str = "contract";

/// Outcome of a successful eligibility check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportEligibility {
    pub period_index: u32,
    pub membership_year: u32,
    pub granted_this_year: u32,
    pub min_amount: u64,
    pub max_amount: u64,
    pub repay_by: NaiveDate,
}

/// Explicit back-office authorization to settle a support against the accrued nominal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OffsetAuthorization {
    pub authorized_by: ActorId,
    pub reference: String,
}

/// Result of closing a support through repayment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportRepayment {
    pub repaid_at: NaiveDate,
    pub repay_by: NaiveDate,
    pub late: bool,
}

#[derive(Debug, Clone)]
pub struct SupportEligibilityEngine {
    policy: SupportPolicy,
    grace: GracePolicy,
}

impl Default for SupportEligibilityEngine {
    fn default() -> Self {
        Self::from_policy(&CaissePolicy::default())
    }
}

impl SupportEligibilityEngine {
    pub fn new(policy: SupportPolicy, grace: GracePolicy) -> Self {
        Self { policy, grace }
    }

    pub fn from_policy(policy: &CaissePolicy) -> Self {
        Self::new(policy.support, policy.grace)
    }

    /// Runs every eligibility rule in order and reports the first one violated.
    pub fn can_request_support(
        &self,
        contract: &Contract,
        as_of: NaiveDate,
    ) -> Result<SupportEligibility, CaisseError> {
        if contract.status != ContractStatus::Active {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &contract.id,
                "request support on",
                contract.status,
            ));
        }
        let Some(first) = contract.first_payment_date else {
            return Err(CaisseError::NotYetEligible { eligible_on: None });
        };

        // Periods are anchored monthly for both frequencies, so the wait ends on the due date
        // of period `waiting_periods + 1`.
        let eligible_on = schedule::shift_months(first, self.policy.waiting_periods);
        if as_of < eligible_on {
            return Err(CaisseError::NotYetEligible {
                eligible_on: Some(eligible_on),
            });
        }

        let duration = contract.subscription_tier.duration_in_months;
        let current = schedule::current_period(first, duration, as_of).ok_or_else(|| {
            CaisseError::invalid_transition(ENTITY, &contract.id, "request support on", "past its term")
        })?;

        if let Some(gap) = self.contribution_gap(contract, first, &current, as_of) {
            return Err(CaisseError::ContributionsNotCurrent(gap));
        }

        if let Some(support_id) = &contract.current_support_id {
            return Err(CaisseError::SupportOutstanding {
                support_id: support_id.clone(),
            });
        }

        let (membership_year, _, _) =
            schedule::membership_year(first, as_of, self.policy.periods_per_year);
        let granted_this_year = self.granted_in_year(contract, membership_year);
        if granted_this_year >= self.policy.annual_limit {
            return Err(CaisseError::AnnualLimitReached {
                granted: granted_this_year,
                limit: self.policy.annual_limit,
            });
        }

        let last_grant = contract
            .support_history
            .iter()
            .map(|record| record.period_index)
            .max();
        if let Some(previous_period) = last_grant {
            if previous_period + 1 >= current.index {
                return Err(CaisseError::ConsecutiveMonthViolation { previous_period });
            }
        }

        Ok(SupportEligibility {
            period_index: current.index,
            membership_year,
            granted_this_year,
            min_amount: contract.subscription_tier.support_min,
            max_amount: contract.subscription_tier.support_max,
            repay_by: schedule::next_due_date_after(first, duration, as_of),
        })
    }

    /// Re-validates eligibility, then records the disbursement as the current support.
    pub fn grant_support(
        &self,
        contract: &mut Contract,
        support_id: SupportId,
        amount: u64,
        as_of: NaiveDate,
    ) -> Result<SupportRecord, CaisseError> {
        let eligibility = self.can_request_support(contract, as_of)?;
        if amount < eligibility.min_amount || amount > eligibility.max_amount {
            return Err(ValidationError::SupportAmountOutOfRange {
                amount,
                min: eligibility.min_amount,
                max: eligibility.max_amount,
            }
            .into());
        }

        let record = SupportRecord {
            id: support_id,
            granted_at: as_of,
            amount,
            repaid_at: None,
            month_index_at_grant: eligibility.granted_this_year + 1,
            period_index: eligibility.period_index,
            repay_by: eligibility.repay_by,
            settlement: None,
            settled_by: None,
        };
        contract.current_support_id = Some(record.id.clone());
        contract.support_history.push(record.clone());
        Ok(record)
    }

    /// Closes the outstanding support. Repayment past `repay_by` is accepted but flagged late.
    pub fn repay_support(
        &self,
        contract: &mut Contract,
        support_id: &SupportId,
        repaid_at: NaiveDate,
        repaid_by: Option<&ActorId>,
    ) -> Result<SupportRepayment, CaisseError> {
        let record = close_outstanding(contract, support_id, "repay support on")?;
        record.repaid_at = Some(repaid_at);
        record.settlement = Some(SupportSettlement::Repaid);
        record.settled_by = repaid_by.cloned();

        let repayment = SupportRepayment {
            repaid_at,
            repay_by: record.repay_by,
            late: repaid_at > record.repay_by,
        };
        contract.current_support_id = None;
        Ok(repayment)
    }

    /// Reports `OverdueSupport` while the outstanding support is unpaid past its deadline.
    pub fn check_support_overdue(
        &self,
        contract: &Contract,
        as_of: NaiveDate,
    ) -> Result<(), CaisseError> {
        match contract.current_support() {
            Some(record) if record.is_outstanding() && as_of > record.repay_by => {
                Err(CaisseError::OverdueSupport {
                    support_id: record.id.clone(),
                    repay_by: record.repay_by,
                })
            }
            _ => Ok(()),
        }
    }

    /// Records a settlement by offset against the accrued nominal.
    pub fn record_forced_settlement(
        &self,
        contract: &mut Contract,
        support_id: &SupportId,
        authorization: &OffsetAuthorization,
        settled_at: NaiveDate,
    ) -> Result<(), CaisseError> {
        if authorization.authorized_by.0.trim().is_empty()
            || authorization.reference.trim().is_empty()
        {
            return Err(ValidationError::IncompleteAuthorization.into());
        }

        let record = close_outstanding(contract, support_id, "force settlement on")?;
        record.repaid_at = Some(settled_at);
        record.settlement = Some(SupportSettlement::ForcedOffset);
        record.settled_by = Some(authorization.authorized_by.clone());
        contract.current_support_id = None;
        Ok(())
    }

    fn contribution_gap(
        &self,
        contract: &Contract,
        first: NaiveDate,
        current: &ScheduledPeriod,
        as_of: NaiveDate,
    ) -> Option<ContributionGap> {
        let forfeited = schedule::periods(first, current.index - 1)
            .into_iter()
            .find(|period| {
                contract.payment_for_period(period.index).is_none()
                    && schedule::classify(period.due_date, as_of, &self.grace)
                        == PaymentClassification::Forfeited
            });
        if let Some(period) = forfeited {
            return Some(ContributionGap::ForfeitedPeriod {
                period_index: period.index,
                due_date: period.due_date,
            });
        }

        contract
            .payment_for_period(current.index)
            .is_none()
            .then(|| ContributionGap::CurrentPeriodUnpaid {
                period_index: current.index,
                due_date: current.due_date,
            })
    }

    fn granted_in_year(&self, contract: &Contract, membership_year: u32) -> u32 {
        let per_year = self.policy.periods_per_year.max(1);
        let granted = contract
            .support_history
            .iter()
            .filter(|record| record.period_index.saturating_sub(1) / per_year == membership_year)
            .count();
        u32::try_from(granted).unwrap_or(u32::MAX)
    }
}

fn close_outstanding<'a>(
    contract: &'a mut Contract,
    support_id: &SupportId,
    action: &'static str,
) -> Result<&'a mut SupportRecord, CaisseError> {
    if contract.status != ContractStatus::Active {
        return Err(CaisseError::invalid_transition(
            ENTITY,
            &contract.id,
            action,
            contract.status,
        ));
    }
    require_activated(contract, action)?;
    if contract.current_support_id.as_ref() != Some(support_id) {
        return Err(CaisseError::NotFound {
            entity: "outstanding support",
            id: support_id.0.clone(),
        });
    }

    contract
        .support_history
        .iter_mut()
        .find(|record| &record.id == support_id)
        .ok_or_else(|| CaisseError::NotFound {
            entity: "support",
            id: support_id.0.clone(),
        })
}

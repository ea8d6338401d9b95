use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::super::demands::validation::validate_reason;
use super::super::domain::{
    ActorId, Contract, ContractId, ContractStatus, Demand, EarlyRefund, FinalRefund,
    PaymentRecord, PenaltyRecord, SupportSettlement,
};
use super::super::error::{CaisseError, ValidationError};
use super::super::policy::{CaissePolicy, GracePolicy};
use super::super::schedule::{self, PaymentClassification};

const ENTITY: &str = "contract";

/// Builds the ACTIVE contract for a demand being converted.
///
/// Tier, member and emergency contact are copied from the demand snapshots; the live catalog
/// is never consulted. The first payment date stays unset until activation.
pub fn instantiate(demand: &Demand, contract_id: ContractId, at: DateTime<Utc>) -> Contract {
    Contract {
        id: contract_id,
        demand_id: demand.id.clone(),
        member_id: demand.member_id.clone(),
        member: demand.member.clone(),
        emergency_contact: demand.emergency_contact.clone(),
        subscription_tier: demand.subscription_tier.clone(),
        payment_frequency: demand.payment_frequency,
        first_payment_date: None,
        signed_contract_document_id: None,
        total_months_paid: 0,
        payments: Vec::new(),
        penalties: Vec::new(),
        status: ContractStatus::Active,
        current_support_id: None,
        support_history: Vec::new(),
        final_refund: None,
        early_refund: None,
        final_refund_document_id: None,
        early_refund_document_id: None,
        cancel_reason: None,
        canceled_at: None,
        finished_at: None,
        created_at: at,
        updated_at: at,
    }
}

/// Result of crediting one contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub payment: PaymentRecord,
    pub final_refund: Option<FinalRefund>,
}

/// Late current period of an active contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverdueStatus {
    pub period_index: u32,
    pub due_date: NaiveDate,
    pub days_late: i64,
    pub classification: PaymentClassification,
}

/// Contract state machine: activation, contributions, penalties and closure.
#[derive(Debug, Clone)]
pub struct ContractLifecycle {
    grace: GracePolicy,
    min_reason_length: usize,
}

impl Default for ContractLifecycle {
    fn default() -> Self {
        Self::from_policy(&CaissePolicy::default())
    }
}

impl ContractLifecycle {
    pub fn from_policy(policy: &CaissePolicy) -> Self {
        Self {
            grace: policy.grace,
            min_reason_length: policy.min_reason_length,
        }
    }

    pub fn grace(&self) -> &GracePolicy {
        &self.grace
    }

    /// Sets the first payment date once, typically when the signed contract is uploaded.
    pub fn activate(
        &self,
        contract: &mut Contract,
        first_payment_date: NaiveDate,
        signed_contract_document_id: Option<String>,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        ensure_active(contract, "activate")?;
        if contract.first_payment_date.is_some() {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &contract.id,
                "activate",
                "already activated",
            ));
        }

        contract.first_payment_date = Some(first_payment_date);
        if signed_contract_document_id.is_some() {
            contract.signed_contract_document_id = signed_contract_document_id;
        }
        contract.updated_at = at;
        Ok(())
    }

    /// Credits the scheduled period containing `period_date`, finishing the contract when the
    /// last period is paid and no support is outstanding.
    pub fn record_payment(
        &self,
        contract: &mut Contract,
        period_date: NaiveDate,
        paid_at: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<PaymentOutcome, CaisseError> {
        ensure_active(contract, "record a payment on")?;
        let first = require_activated(contract, "record a payment on")?;
        let duration = contract.subscription_tier.duration_in_months;

        let period = schedule::period_for_date(first, duration, period_date)
            .ok_or(ValidationError::PeriodOutsideTerm { date: period_date })?;
        if contract.payment_for_period(period.index).is_some() {
            return Err(ValidationError::DuplicatePayment {
                period_index: period.index,
            }
            .into());
        }

        let payment = PaymentRecord {
            period_index: period.index,
            due_date: period.due_date,
            paid_at,
            classification: schedule::classify(period.due_date, paid_at, &self.grace),
        };
        contract.payments.push(payment.clone());
        contract.total_months_paid += 1;
        contract.updated_at = at;

        Ok(PaymentOutcome {
            payment,
            final_refund: self.finish_if_settled(contract, at),
        })
    }

    /// Finishes an active contract once every period is paid and no support is outstanding.
    pub fn finish_if_settled(
        &self,
        contract: &mut Contract,
        at: DateTime<Utc>,
    ) -> Option<FinalRefund> {
        let settled = contract.status == ContractStatus::Active
            && contract.is_fully_paid()
            && contract.current_support_id.is_none();
        settled.then(|| finish(contract, at))
    }

    /// Finishes a fully paid contract whose support has since been settled.
    pub fn try_complete(
        &self,
        contract: &mut Contract,
        at: DateTime<Utc>,
    ) -> Result<FinalRefund, CaisseError> {
        ensure_active(contract, "complete")?;
        if !contract.is_fully_paid() {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &contract.id,
                "complete",
                format!(
                    "{}/{} periods paid",
                    contract.total_months_paid, contract.subscription_tier.duration_in_months
                ),
            ));
        }
        if let Some(support_id) = &contract.current_support_id {
            return Err(CaisseError::SupportOutstanding {
                support_id: support_id.clone(),
            });
        }
        Ok(finish(contract, at))
    }

    pub fn assess_penalty(
        &self,
        contract: &mut Contract,
        period_index: u32,
        amount: u64,
        assessed_by: &ActorId,
        assessed_at: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<PenaltyRecord, CaisseError> {
        ensure_active(contract, "assess a penalty on")?;
        let duration = contract.subscription_tier.duration_in_months;
        if period_index == 0 || period_index > duration {
            return Err(ValidationError::PeriodIndexOutOfRange {
                period_index,
                duration,
            }
            .into());
        }
        if amount == 0 {
            return Err(ValidationError::ZeroPenalty.into());
        }
        let already_open = contract
            .penalties
            .iter()
            .any(|penalty| penalty.period_index == period_index && penalty.settled_at.is_none());
        if already_open {
            return Err(ValidationError::DuplicatePenalty { period_index }.into());
        }
        let nominal = contract.subscription_tier.nominal;
        let total = contract.unsettled_penalties().saturating_add(amount);
        if total > nominal {
            return Err(ValidationError::PenaltiesExceedNominal { total, nominal }.into());
        }

        let penalty = PenaltyRecord {
            period_index,
            amount,
            assessed_at,
            assessed_by: assessed_by.clone(),
            settled_at: None,
        };
        contract.penalties.push(penalty.clone());
        contract.updated_at = at;
        Ok(penalty)
    }

    pub fn settle_penalty(
        &self,
        contract: &mut Contract,
        period_index: u32,
        settled_at: NaiveDate,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        ensure_active(contract, "settle a penalty on")?;
        let penalty = contract
            .penalties
            .iter_mut()
            .find(|penalty| penalty.period_index == period_index && penalty.settled_at.is_none())
            .ok_or(ValidationError::UnknownPenalty { period_index })?;
        penalty.settled_at = Some(settled_at);
        contract.updated_at = at;
        Ok(())
    }

    /// Cancels an active contract, netting any outstanding support against the contributions.
    pub fn cancel(
        &self,
        contract: &mut Contract,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Result<EarlyRefund, CaisseError> {
        ensure_active(contract, "cancel")?;
        let reason = validate_reason(reason, self.min_reason_length)?;

        let contributions_paid = contract.contributions_paid();
        let outstanding_support = contract.outstanding_support_amount();
        if outstanding_support > contributions_paid {
            return Err(CaisseError::UnsettledSupport {
                outstanding: outstanding_support,
                contributions_paid,
            });
        }

        if let Some(support_id) = contract.current_support_id.take() {
            if let Some(record) = contract
                .support_history
                .iter_mut()
                .find(|record| record.id == support_id)
            {
                record.repaid_at = Some(at.date_naive());
                record.settlement = Some(SupportSettlement::NettedOnCancel);
            }
        }

        let refund = EarlyRefund {
            contributions_paid,
            outstanding_support,
            amount: contributions_paid - outstanding_support,
        };
        contract.status = ContractStatus::Canceled;
        contract.cancel_reason = Some(reason);
        contract.canceled_at = Some(at);
        contract.early_refund = Some(refund);
        contract.updated_at = at;
        Ok(refund)
    }

    /// Only contracts without any financial activity may be deleted.
    pub fn ensure_deletable(&self, contract: &Contract) -> Result<(), CaisseError> {
        let violation = if contract.status != ContractStatus::Active {
            Some(contract.status.to_string())
        } else if contract.total_months_paid > 0 {
            Some(format!("{} periods paid", contract.total_months_paid))
        } else if contract.current_support_id.is_some() {
            Some("a support is outstanding".to_string())
        } else if !contract.support_history.is_empty() {
            Some("support history is not empty".to_string())
        } else {
            None
        };

        match violation {
            Some(status) => Err(CaisseError::invalid_transition(
                ENTITY,
                &contract.id,
                "delete",
                status,
            )),
            None => Ok(()),
        }
    }

    pub fn attach_final_refund_document(
        &self,
        contract: &mut Contract,
        document_id: String,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        if contract.status != ContractStatus::Finished {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &contract.id,
                "attach a final refund document to",
                contract.status,
            ));
        }
        contract.final_refund_document_id = Some(document_id);
        contract.updated_at = at;
        Ok(())
    }

    pub fn attach_early_refund_document(
        &self,
        contract: &mut Contract,
        document_id: String,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        if contract.status != ContractStatus::Canceled {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &contract.id,
                "attach an early refund document to",
                contract.status,
            ));
        }
        contract.early_refund_document_id = Some(document_id);
        contract.updated_at = at;
        Ok(())
    }

    /// The current period is late (past the grace window) and still unpaid.
    pub fn overdue_status(&self, contract: &Contract, today: NaiveDate) -> Option<OverdueStatus> {
        if contract.status != ContractStatus::Active {
            return None;
        }
        let first = contract.first_payment_date?;
        let period = schedule::current_period(
            first,
            contract.subscription_tier.duration_in_months,
            today,
        )?;
        if contract.payment_for_period(period.index).is_some() {
            return None;
        }

        let classification = schedule::classify(period.due_date, today, &self.grace);
        classification.is_late().then(|| OverdueStatus {
            period_index: period.index,
            due_date: period.due_date,
            days_late: (today - period.due_date).num_days(),
            classification,
        })
    }
}

fn ensure_active(contract: &Contract, action: &'static str) -> Result<(), CaisseError> {
    if contract.status == ContractStatus::Active {
        Ok(())
    } else {
        Err(CaisseError::invalid_transition(
            ENTITY,
            &contract.id,
            action,
            contract.status,
        ))
    }
}

pub(crate) fn require_activated(
    contract: &Contract,
    action: &'static str,
) -> Result<NaiveDate, CaisseError> {
    contract.first_payment_date.ok_or_else(|| {
        CaisseError::invalid_transition(ENTITY, &contract.id, action, "not yet activated")
    })
}

fn finish(contract: &mut Contract, at: DateTime<Utc>) -> FinalRefund {
    let nominal = contract.subscription_tier.nominal;
    let unpaid_penalties = contract.unsettled_penalties();
    let refund = FinalRefund {
        nominal,
        unpaid_penalties,
        amount: nominal.saturating_sub(unpaid_penalties),
    };
    contract.status = ContractStatus::Finished;
    contract.final_refund = Some(refund);
    contract.finished_at = Some(at);
    contract.updated_at = at;
    refund
}

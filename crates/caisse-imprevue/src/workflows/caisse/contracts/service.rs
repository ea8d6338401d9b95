use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use super::super::domain::{
    ActorId, Contract, ContractId, EarlyRefund, FinalRefund, PenaltyRecord, SupportId,
    SupportRecord,
};
use super::super::error::CaisseError;
use super::super::events::{publish_committed, CaisseEvent, EventPublisher};
use super::super::policy::CaissePolicy;
use super::super::repository::{with_retry, CaisseRepository, Versioned};
use super::super::schedule;
use super::super::support::{
    OffsetAuthorization, SupportEligibility, SupportEligibilityEngine, SupportRepayment,
};
use super::lifecycle::{ContractLifecycle, OverdueStatus, PaymentOutcome};

const ENTITY: &str = "contract";

static SUPPORT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_support_id() -> SupportId {
    let id = SUPPORT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    SupportId(format!("SUP-{id:06}"))
}

/// Service applying lifecycle and support rules to stored contracts.
pub struct ContractService<R, P> {
    lifecycle: ContractLifecycle,
    support: SupportEligibilityEngine,
    max_write_attempts: u32,
    repository: Arc<R>,
    events: Arc<P>,
}

impl<R, P> ContractService<R, P>
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(repository: Arc<R>, events: Arc<P>, policy: CaissePolicy) -> Self {
        Self {
            lifecycle: ContractLifecycle::from_policy(&policy),
            support: SupportEligibilityEngine::from_policy(&policy),
            max_write_attempts: policy.max_write_attempts,
            repository,
            events,
        }
    }

    pub fn get(&self, contract_id: &ContractId) -> Result<Versioned<Contract>, CaisseError> {
        self.load(contract_id)
    }

    pub fn activate(
        &self,
        contract_id: &ContractId,
        first_payment_date: NaiveDate,
        signed_contract_document_id: Option<String>,
    ) -> Result<Versioned<Contract>, CaisseError> {
        let (stored, ()) = self.mutate(contract_id, |contract, now| {
            self.lifecycle.activate(
                contract,
                first_payment_date,
                signed_contract_document_id.clone(),
                now,
            )
        })?;
        info!(contract_id = %contract_id, %first_payment_date, "contract activated");
        self.publish(CaisseEvent::ContractActivated {
            contract_id: contract_id.clone(),
            first_payment_date,
        });
        Ok(stored)
    }

    pub fn record_payment(
        &self,
        contract_id: &ContractId,
        period_date: NaiveDate,
        paid_at: NaiveDate,
    ) -> Result<PaymentOutcome, CaisseError> {
        let (_, outcome) = self.mutate(contract_id, |contract, now| {
            self.lifecycle
                .record_payment(contract, period_date, paid_at, now)
        })?;

        info!(
            contract_id = %contract_id,
            period = outcome.payment.period_index,
            classification = outcome.payment.classification.label(),
            "contribution recorded"
        );
        self.publish(CaisseEvent::PaymentRecorded {
            contract_id: contract_id.clone(),
            period_index: outcome.payment.period_index,
            classification: outcome.payment.classification,
        });
        if let Some(final_refund) = outcome.final_refund {
            self.finished(contract_id, final_refund);
        }
        Ok(outcome)
    }

    pub fn try_complete(&self, contract_id: &ContractId) -> Result<FinalRefund, CaisseError> {
        let (_, final_refund) = self.mutate(contract_id, |contract, now| {
            self.lifecycle.try_complete(contract, now)
        })?;
        self.finished(contract_id, final_refund);
        Ok(final_refund)
    }

    pub fn assess_penalty(
        &self,
        contract_id: &ContractId,
        period_index: u32,
        amount: u64,
        assessed_by: &ActorId,
        assessed_at: NaiveDate,
    ) -> Result<PenaltyRecord, CaisseError> {
        let (_, penalty) = self.mutate(contract_id, |contract, now| {
            self.lifecycle
                .assess_penalty(contract, period_index, amount, assessed_by, assessed_at, now)
        })?;
        info!(contract_id = %contract_id, period = period_index, amount, "penalty assessed");
        self.publish(CaisseEvent::PenaltyAssessed {
            contract_id: contract_id.clone(),
            period_index,
            amount,
            assessed_by: assessed_by.clone(),
        });
        Ok(penalty)
    }

    pub fn settle_penalty(
        &self,
        contract_id: &ContractId,
        period_index: u32,
        settled_at: NaiveDate,
    ) -> Result<Versioned<Contract>, CaisseError> {
        let (stored, ()) = self.mutate(contract_id, |contract, now| {
            self.lifecycle
                .settle_penalty(contract, period_index, settled_at, now)
        })?;
        info!(contract_id = %contract_id, period = period_index, "penalty settled");
        Ok(stored)
    }

    pub fn cancel(
        &self,
        contract_id: &ContractId,
        reason: &str,
    ) -> Result<EarlyRefund, CaisseError> {
        let (_, early_refund) = self.mutate(contract_id, |contract, now| {
            self.lifecycle.cancel(contract, reason, now)
        })?;
        info!(
            contract_id = %contract_id,
            refund = early_refund.amount,
            netted_support = early_refund.outstanding_support,
            "contract canceled"
        );
        self.publish(CaisseEvent::ContractCanceled {
            contract_id: contract_id.clone(),
            early_refund,
        });
        Ok(early_refund)
    }

    pub fn delete(&self, contract_id: &ContractId) -> Result<(), CaisseError> {
        with_retry(ENTITY, &contract_id.0, self.max_write_attempts, || {
            let stored = self.load(contract_id)?;
            self.lifecycle.ensure_deletable(&stored.record)?;
            self.repository
                .delete_contract(contract_id, stored.version)?;
            Ok(())
        })?;
        info!(contract_id = %contract_id, "contract deleted");
        self.publish(CaisseEvent::ContractDeleted {
            contract_id: contract_id.clone(),
        });
        Ok(())
    }

    pub fn attach_final_refund_document(
        &self,
        contract_id: &ContractId,
        document_id: String,
    ) -> Result<Versioned<Contract>, CaisseError> {
        let (stored, ()) = self.mutate(contract_id, |contract, now| {
            self.lifecycle
                .attach_final_refund_document(contract, document_id.clone(), now)
        })?;
        Ok(stored)
    }

    pub fn attach_early_refund_document(
        &self,
        contract_id: &ContractId,
        document_id: String,
    ) -> Result<Versioned<Contract>, CaisseError> {
        let (stored, ()) = self.mutate(contract_id, |contract, now| {
            self.lifecycle
                .attach_early_refund_document(contract, document_id.clone(), now)
        })?;
        Ok(stored)
    }

    pub fn support_eligibility(
        &self,
        contract_id: &ContractId,
        as_of: NaiveDate,
    ) -> Result<SupportEligibility, CaisseError> {
        let stored = self.load(contract_id)?;
        self.support.can_request_support(&stored.record, as_of)
    }

    pub fn grant_support(
        &self,
        contract_id: &ContractId,
        amount: u64,
        as_of: NaiveDate,
    ) -> Result<SupportRecord, CaisseError> {
        let (_, record) = self.mutate(contract_id, |contract, _| {
            self.support
                .grant_support(contract, next_support_id(), amount, as_of)
        })?;
        info!(
            contract_id = %contract_id,
            support_id = %record.id,
            amount,
            repay_by = %record.repay_by,
            "support granted"
        );
        self.publish(CaisseEvent::SupportGranted {
            contract_id: contract_id.clone(),
            support_id: record.id.clone(),
            amount,
            repay_by: record.repay_by,
        });
        Ok(record)
    }

    pub fn repay_support(
        &self,
        contract_id: &ContractId,
        support_id: &SupportId,
        repaid_at: NaiveDate,
        repaid_by: Option<&ActorId>,
    ) -> Result<SupportRepayment, CaisseError> {
        let (_, (repayment, final_refund)) = self.mutate(contract_id, |contract, now| {
            let repayment = self
                .support
                .repay_support(contract, support_id, repaid_at, repaid_by)?;
            Ok((repayment, self.lifecycle.finish_if_settled(contract, now)))
        })?;
        if repayment.late {
            warn!(
                contract_id = %contract_id,
                support_id = %support_id,
                repay_by = %repayment.repay_by,
                "support repaid after its deadline"
            );
        } else {
            info!(contract_id = %contract_id, support_id = %support_id, "support repaid");
        }
        self.publish(CaisseEvent::SupportRepaid {
            contract_id: contract_id.clone(),
            support_id: support_id.clone(),
            late: repayment.late,
        });
        if let Some(final_refund) = final_refund {
            self.finished(contract_id, final_refund);
        }
        Ok(repayment)
    }

    pub fn check_support_overdue(
        &self,
        contract_id: &ContractId,
        as_of: NaiveDate,
    ) -> Result<(), CaisseError> {
        let stored = self.load(contract_id)?;
        self.support.check_support_overdue(&stored.record, as_of)
    }

    pub fn force_settle_support(
        &self,
        contract_id: &ContractId,
        support_id: &SupportId,
        authorization: &OffsetAuthorization,
        settled_at: NaiveDate,
    ) -> Result<Versioned<Contract>, CaisseError> {
        let (stored, final_refund) = self.mutate(contract_id, |contract, now| {
            self.support
                .record_forced_settlement(contract, support_id, authorization, settled_at)?;
            Ok(self.lifecycle.finish_if_settled(contract, now))
        })?;
        warn!(
            contract_id = %contract_id,
            support_id = %support_id,
            authorized_by = %authorization.authorized_by,
            reference = %authorization.reference,
            "support settled by offset"
        );
        self.publish(CaisseEvent::SupportForceSettled {
            contract_id: contract_id.clone(),
            support_id: support_id.clone(),
            authorized_by: authorization.authorized_by.clone(),
            reference: authorization.reference.clone(),
        });
        if let Some(final_refund) = final_refund {
            self.finished(contract_id, final_refund);
        }
        Ok(stored)
    }

    pub fn overdue_status(
        &self,
        contract_id: &ContractId,
        today: NaiveDate,
    ) -> Result<Option<OverdueStatus>, CaisseError> {
        let stored = self.load(contract_id)?;
        Ok(self.lifecycle.overdue_status(&stored.record, today))
    }

    /// Whether a contribution falls due for the contract in the given calendar month.
    pub fn is_due_in_month(
        &self,
        contract_id: &ContractId,
        year: i32,
        month: u32,
    ) -> Result<bool, CaisseError> {
        let stored = self.load(contract_id)?;
        Ok(schedule::is_due_in_month(&stored.record, year, month))
    }

    /// Lists every late contract and announces each one.
    pub fn scan_overdue(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<(ContractId, OverdueStatus)>, CaisseError> {
        let overdue: Vec<_> = self
            .repository
            .contracts()?
            .into_iter()
            .filter_map(|stored| {
                self.lifecycle
                    .overdue_status(&stored.record, today)
                    .map(|status| (stored.record.id, status))
            })
            .collect();

        for (contract_id, status) in &overdue {
            self.publish(CaisseEvent::ContractOverdueDetected {
                contract_id: contract_id.clone(),
                period_index: status.period_index,
                due_date: status.due_date,
                classification: status.classification,
            });
        }
        info!(%today, overdue = overdue.len(), "overdue scan finished");
        Ok(overdue)
    }

    fn finished(&self, contract_id: &ContractId, final_refund: FinalRefund) {
        info!(contract_id = %contract_id, refund = final_refund.amount, "contract finished");
        self.publish(CaisseEvent::ContractFinished {
            contract_id: contract_id.clone(),
            final_refund,
        });
    }

    fn publish(&self, event: CaisseEvent) {
        publish_committed(&*self.events, event);
    }

    fn load(&self, contract_id: &ContractId) -> Result<Versioned<Contract>, CaisseError> {
        self.repository
            .fetch_contract(contract_id)?
            .ok_or_else(|| CaisseError::NotFound {
                entity: ENTITY,
                id: contract_id.0.clone(),
            })
    }

    fn mutate<T, F>(
        &self,
        contract_id: &ContractId,
        mut action: F,
    ) -> Result<(Versioned<Contract>, T), CaisseError>
    where
        F: FnMut(&mut Contract, DateTime<Utc>) -> Result<T, CaisseError>,
    {
        with_retry(ENTITY, &contract_id.0, self.max_write_attempts, || {
            let Versioned {
                version,
                record: mut contract,
            } = self.load(contract_id)?;
            let outcome = action(&mut contract, Utc::now())?;
            let version = self.repository.save_contract(contract.clone(), version)?;
            Ok((Versioned::new(version, contract), outcome))
        })
    }
}

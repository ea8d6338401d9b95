use chrono::{DateTime, Utc};

use super::super::catalog::TierSnapshot;
use super::super::contracts::lifecycle;
use super::super::domain::{
    ActorId, Contract, ContractId, DeletionConfirmation, Demand, DemandId, DemandStatus,
    DemandSubmission, EmergencyContact, PaymentFrequency,
};
use super::super::error::CaisseError;
use super::super::policy::CaissePolicy;
use super::validation::{
    require_complete_contact, validate_cause, validate_reason, verify_confirmation,
};

const ENTITY: &str = "demand";

/// Pure state machine for membership demands.
///
/// Every transition checks the current status before touching the record, so a failed call
/// leaves the demand exactly as it was.
#[derive(Debug, Clone)]
pub struct DemandWorkflow {
    policy: CaissePolicy,
}

impl Default for DemandWorkflow {
    fn default() -> Self {
        Self::new(CaissePolicy::default())
    }
}

impl DemandWorkflow {
    pub fn new(policy: CaissePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CaissePolicy {
        &self.policy
    }

    /// Builds a PENDING demand. The emergency contact may still be missing or incomplete.
    pub fn submit(
        &self,
        id: DemandId,
        submission: DemandSubmission,
        tier: TierSnapshot,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<Demand, CaisseError> {
        let payment_frequency: PaymentFrequency = submission.payment_frequency.parse()?;
        let cause = validate_cause(&submission.cause, &self.policy)?;

        Ok(Demand {
            id,
            member_id: submission.member_id,
            member: submission.member,
            subscription_tier: tier,
            payment_frequency,
            desired_date: submission.desired_date,
            cause,
            emergency_contact: submission.emergency_contact,
            status: DemandStatus::Pending,
            decision_reason: None,
            decision_made_at: None,
            decision_made_by: None,
            reopen_reason: None,
            reopened_at: None,
            reopened_by: None,
            contract_id: None,
            created_at: at,
            created_by: actor.clone(),
            updated_at: at,
        })
    }

    pub fn approve(
        &self,
        demand: &mut Demand,
        reason: &str,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        if !demand.status.awaits_decision() {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &demand.id,
                "approve",
                demand.status,
            ));
        }
        let reason = validate_reason(reason, self.policy.min_reason_length)?;
        require_complete_contact(demand.emergency_contact.as_ref())?;

        self.record_decision(demand, DemandStatus::Approved, reason, actor, at);
        Ok(())
    }

    pub fn reject(
        &self,
        demand: &mut Demand,
        reason: &str,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        if !demand.status.awaits_decision() {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &demand.id,
                "reject",
                demand.status,
            ));
        }
        let reason = validate_reason(reason, self.policy.min_reason_length)?;

        self.record_decision(demand, DemandStatus::Rejected, reason, actor, at);
        Ok(())
    }

    pub fn reopen(
        &self,
        demand: &mut Demand,
        reason: &str,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        if demand.status != DemandStatus::Rejected {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &demand.id,
                "reopen",
                demand.status,
            ));
        }
        let reason = validate_reason(reason, self.policy.min_reason_length)?;

        demand.status = DemandStatus::Reopened;
        demand.reopen_reason = Some(reason);
        demand.reopened_at = Some(at);
        demand.reopened_by = Some(actor.clone());
        demand.updated_at = at;
        Ok(())
    }

    pub fn update_emergency_contact(
        &self,
        demand: &mut Demand,
        contact: EmergencyContact,
        at: DateTime<Utc>,
    ) -> Result<(), CaisseError> {
        if demand.status == DemandStatus::Converted {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &demand.id,
                "edit the emergency contact of",
                demand.status,
            ));
        }
        demand.emergency_contact = Some(contact);
        demand.updated_at = at;
        Ok(())
    }

    /// Converts an APPROVED demand, returning the contract to persist alongside it.
    ///
    /// The `contract_id` check comes first so a retried conversion reports
    /// `AlreadyConverted` instead of creating a second contract.
    pub fn convert(
        &self,
        demand: &mut Demand,
        contract_id: ContractId,
        at: DateTime<Utc>,
    ) -> Result<Contract, CaisseError> {
        if let Some(existing) = &demand.contract_id {
            return Err(CaisseError::AlreadyConverted {
                demand_id: demand.id.clone(),
                contract_id: existing.clone(),
            });
        }
        if demand.status != DemandStatus::Approved {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &demand.id,
                "convert",
                demand.status,
            ));
        }
        require_complete_contact(demand.emergency_contact.as_ref())?;

        let contract = lifecycle::instantiate(demand, contract_id, at);
        demand.status = DemandStatus::Converted;
        demand.contract_id = Some(contract.id.clone());
        demand.updated_at = at;
        Ok(contract)
    }

    pub fn ensure_deletable(
        &self,
        demand: &Demand,
        confirmation: &DeletionConfirmation,
    ) -> Result<(), CaisseError> {
        if demand.status == DemandStatus::Converted {
            return Err(CaisseError::invalid_transition(
                ENTITY,
                &demand.id,
                "delete",
                demand.status,
            ));
        }
        verify_confirmation(demand, confirmation)?;
        Ok(())
    }

    fn record_decision(
        &self,
        demand: &mut Demand,
        status: DemandStatus,
        reason: String,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) {
        demand.status = status;
        demand.decision_reason = Some(reason);
        demand.decision_made_at = Some(at);
        demand.decision_made_by = Some(actor.clone());
        demand.updated_at = at;
    }
}

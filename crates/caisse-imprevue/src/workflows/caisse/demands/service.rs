use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use super::super::catalog::TierSource;
use super::super::domain::{
    ActorId, Contract, ContractId, DeletionConfirmation, Demand, DemandId, DemandSubmission,
    EmergencyContact,
};
use super::super::error::CaisseError;
use super::super::events::{publish_committed, CaisseEvent, EventPublisher};
use super::super::policy::CaissePolicy;
use super::super::repository::{with_retry, CaisseRepository, Versioned};
use super::workflow::DemandWorkflow;

const ENTITY: &str = "demand";

static DEMAND_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static CONTRACT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_demand_id() -> DemandId {
    let id = DEMAND_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    DemandId(format!("DEM-{id:06}"))
}

fn next_contract_id() -> ContractId {
    let id = CONTRACT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    ContractId(format!("CTR-{id:06}"))
}

/// Service composing the demand workflow with the document store, the tier catalog and the
/// event publisher.
pub struct DemandService<R, P> {
    workflow: DemandWorkflow,
    catalog: Arc<dyn TierSource>,
    repository: Arc<R>,
    events: Arc<P>,
}

impl<R, P> DemandService<R, P>
where
    R: CaisseRepository + 'static,
    P: EventPublisher + 'static,
{
    pub fn new(
        catalog: Arc<dyn TierSource>,
        repository: Arc<R>,
        events: Arc<P>,
        policy: CaissePolicy,
    ) -> Self {
        Self {
            workflow: DemandWorkflow::new(policy),
            catalog,
            repository,
            events,
        }
    }

    /// Validate and store a new PENDING demand, snapshotting the requested tier.
    pub fn submit(
        &self,
        submission: DemandSubmission,
        actor: &ActorId,
    ) -> Result<Versioned<Demand>, CaisseError> {
        let tier = self.catalog.get_tier(&submission.tier_code)?;
        let demand =
            self.workflow
                .submit(next_demand_id(), submission, tier.snapshot(), actor, Utc::now())?;

        let stored = self.repository.insert_demand(demand)?;
        info!(
            demand_id = %stored.record.id,
            member_id = %stored.record.member_id,
            tier = %stored.record.subscription_tier.code,
            "demand submitted"
        );
        publish_committed(
            &*self.events,
            CaisseEvent::DemandSubmitted {
                demand_id: stored.record.id.clone(),
                member_id: stored.record.member_id.clone(),
            },
        );
        Ok(stored)
    }

    pub fn approve(
        &self,
        demand_id: &DemandId,
        reason: &str,
        actor: &ActorId,
    ) -> Result<Versioned<Demand>, CaisseError> {
        let stored = self.transition(demand_id, |demand, now| {
            self.workflow.approve(demand, reason, actor, now)
        })?;
        info!(demand_id = %demand_id, decided_by = %actor, "demand approved");
        publish_committed(
            &*self.events,
            CaisseEvent::DemandApproved {
                demand_id: demand_id.clone(),
                decided_by: actor.clone(),
            },
        );
        Ok(stored)
    }

    pub fn reject(
        &self,
        demand_id: &DemandId,
        reason: &str,
        actor: &ActorId,
    ) -> Result<Versioned<Demand>, CaisseError> {
        let stored = self.transition(demand_id, |demand, now| {
            self.workflow.reject(demand, reason, actor, now)
        })?;
        info!(demand_id = %demand_id, decided_by = %actor, "demand rejected");
        publish_committed(
            &*self.events,
            CaisseEvent::DemandRejected {
                demand_id: demand_id.clone(),
                decided_by: actor.clone(),
            },
        );
        Ok(stored)
    }

    pub fn reopen(
        &self,
        demand_id: &DemandId,
        reason: &str,
        actor: &ActorId,
    ) -> Result<Versioned<Demand>, CaisseError> {
        let stored = self.transition(demand_id, |demand, now| {
            self.workflow.reopen(demand, reason, actor, now)
        })?;
        info!(demand_id = %demand_id, reopened_by = %actor, "demand reopened");
        publish_committed(
            &*self.events,
            CaisseEvent::DemandReopened {
                demand_id: demand_id.clone(),
                reopened_by: actor.clone(),
            },
        );
        Ok(stored)
    }

    pub fn update_emergency_contact(
        &self,
        demand_id: &DemandId,
        contact: EmergencyContact,
    ) -> Result<Versioned<Demand>, CaisseError> {
        self.transition(demand_id, |demand, now| {
            self.workflow
                .update_emergency_contact(demand, contact.clone(), now)
        })
    }

    /// Convert an APPROVED demand into its contract in one atomic store write.
    pub fn convert(&self, demand_id: &DemandId) -> Result<Contract, CaisseError> {
        let contract = with_retry(
            ENTITY,
            &demand_id.0,
            self.workflow.policy().max_write_attempts,
            || {
                let Versioned {
                    version,
                    record: mut demand,
                } = self.load(demand_id)?;
                let contract = self
                    .workflow
                    .convert(&mut demand, next_contract_id(), Utc::now())?;
                self.repository
                    .commit_conversion(demand, version, contract.clone())?;
                Ok(contract)
            },
        )?;

        info!(demand_id = %demand_id, contract_id = %contract.id, "demand converted");
        publish_committed(
            &*self.events,
            CaisseEvent::DemandConverted {
                demand_id: demand_id.clone(),
                contract_id: contract.id.clone(),
            },
        );
        Ok(contract)
    }

    pub fn delete(
        &self,
        demand_id: &DemandId,
        confirmation: &DeletionConfirmation,
    ) -> Result<(), CaisseError> {
        with_retry(
            ENTITY,
            &demand_id.0,
            self.workflow.policy().max_write_attempts,
            || {
                let stored = self.load(demand_id)?;
                self.workflow
                    .ensure_deletable(&stored.record, confirmation)?;
                self.repository.delete_demand(demand_id, stored.version)?;
                Ok(())
            },
        )?;

        info!(demand_id = %demand_id, "demand deleted");
        publish_committed(
            &*self.events,
            CaisseEvent::DemandDeleted {
                demand_id: demand_id.clone(),
            },
        );
        Ok(())
    }

    pub fn get(&self, demand_id: &DemandId) -> Result<Versioned<Demand>, CaisseError> {
        self.load(demand_id)
    }

    fn load(&self, demand_id: &DemandId) -> Result<Versioned<Demand>, CaisseError> {
        self.repository
            .fetch_demand(demand_id)?
            .ok_or_else(|| CaisseError::NotFound {
                entity: ENTITY,
                id: demand_id.0.clone(),
            })
    }

    fn transition<F>(
        &self,
        demand_id: &DemandId,
        action: F,
    ) -> Result<Versioned<Demand>, CaisseError>
    where
        F: Fn(&mut Demand, DateTime<Utc>) -> Result<(), CaisseError>,
    {
        with_retry(
            ENTITY,
            &demand_id.0,
            self.workflow.policy().max_write_attempts,
            || {
                let Versioned {
                    version,
                    record: mut demand,
                } = self.load(demand_id)?;
                action(&mut demand, Utc::now())?;
                let version = self.repository.save_demand(demand.clone(), version)?;
                Ok(Versioned::new(version, demand))
            },
        )
    }
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::domain::{
    ActorId, ContractId, DemandId, EarlyRefund, FinalRefund, MemberId, SupportId,
};
use super::schedule::PaymentClassification;

/// Facts emitted after a committed transition, for notification, export and document
/// generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum CaisseEvent {
    DemandSubmitted {
        demand_id: DemandId,
        member_id: MemberId,
    },
    DemandApproved {
        demand_id: DemandId,
        decided_by: ActorId,
    },
    DemandRejected {
        demand_id: DemandId,
        decided_by: ActorId,
    },
    DemandReopened {
        demand_id: DemandId,
        reopened_by: ActorId,
    },
    DemandConverted {
        demand_id: DemandId,
        contract_id: ContractId,
    },
    DemandDeleted {
        demand_id: DemandId,
    },
    ContractActivated {
        contract_id: ContractId,
        first_payment_date: NaiveDate,
    },
    PaymentRecorded {
        contract_id: ContractId,
        period_index: u32,
        classification: PaymentClassification,
    },
    PenaltyAssessed {
        contract_id: ContractId,
        period_index: u32,
        amount: u64,
        assessed_by: ActorId,
    },
    ContractFinished {
        contract_id: ContractId,
        final_refund: FinalRefund,
    },
    ContractCanceled {
        contract_id: ContractId,
        early_refund: EarlyRefund,
    },
    ContractDeleted {
        contract_id: ContractId,
    },
    SupportGranted {
        contract_id: ContractId,
        support_id: SupportId,
        amount: u64,
        repay_by: NaiveDate,
    },
    SupportRepaid {
        contract_id: ContractId,
        support_id: SupportId,
        late: bool,
    },
    SupportForceSettled {
        contract_id: ContractId,
        support_id: SupportId,
        authorized_by: ActorId,
        reference: String,
    },
    ContractOverdueDetected {
        contract_id: ContractId,
        period_index: u32,
        due_date: NaiveDate,
        classification: PaymentClassification,
    },
}

impl CaisseEvent {
    pub const fn name(&self) -> &'static str {
        match self {
            CaisseEvent::DemandSubmitted { .. } => "DemandSubmitted",
            CaisseEvent::DemandApproved { .. } => "DemandApproved",
            CaisseEvent::DemandRejected { .. } => "DemandRejected",
            CaisseEvent::DemandReopened { .. } => "DemandReopened",
            CaisseEvent::DemandConverted { .. } => "DemandConverted",
            CaisseEvent::DemandDeleted { .. } => "DemandDeleted",
            CaisseEvent::ContractActivated { .. } => "ContractActivated",
            CaisseEvent::PaymentRecorded { .. } => "PaymentRecorded",
            CaisseEvent::PenaltyAssessed { .. } => "PenaltyAssessed",
            CaisseEvent::ContractFinished { .. } => "ContractFinished",
            CaisseEvent::ContractCanceled { .. } => "ContractCanceled",
            CaisseEvent::ContractDeleted { .. } => "ContractDeleted",
            CaisseEvent::SupportGranted { .. } => "SupportGranted",
            CaisseEvent::SupportRepaid { .. } => "SupportRepaid",
            CaisseEvent::SupportForceSettled { .. } => "SupportForceSettled",
            CaisseEvent::ContractOverdueDetected { .. } => "ContractOverdueDetected",
        }
    }
}

/// Outbound hook delivering events to notification/export/document adapters.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: CaisseEvent) -> Result<(), PublishError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("event transport unavailable: {0}")]
    Transport(String),
}

pub(crate) fn publish_committed<P: EventPublisher + ?Sized>(publisher: &P, event: CaisseEvent) {
    let name = event.name();
    if let Err(error) = publisher.publish(event) {
        tracing::warn!(event = name, %error, "event delivery failed after commit");
    }
}

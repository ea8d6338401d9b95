//! Caisse Imprévue: membership demands, contribution schedules, support eligibility and
//! contract closure.
//!
//! The pure state machines ([`DemandWorkflow`], [`ContractLifecycle`],
//! [`SupportEligibilityEngine`]) and the [`schedule`] arithmetic never touch storage. The
//! services run them inside conditional read-validate-write cycles against a
//! [`CaisseRepository`] and announce committed transitions through an [`EventPublisher`].

pub mod catalog;
pub mod contracts;
pub mod demands;
pub mod domain;
pub mod error;
pub mod events;
pub mod policy;
pub mod repository;
pub mod schedule;
pub mod support;

#[cfg(test)]
mod tests;

pub use catalog::{
    CatalogError, SubscriptionCatalog, SubscriptionTier, TierKind, TierSnapshot, TierSource,
};
pub use contracts::{
    contract_router, ContractLifecycle, ContractService, OverdueStatus, PaymentOutcome,
};
pub use demands::{demand_router, DemandService, DemandWorkflow, ACTOR_HEADER};
pub use domain::{
    ActorId, Contract, ContractId, ContractStatus, DeletionConfirmation, Demand, DemandId,
    DemandStatus, DemandSubmission, EarlyRefund, EmergencyContact, FinalRefund,
    IdentityDocumentType, MemberId, MemberSnapshot, PaymentFrequency, PaymentRecord,
    PenaltyRecord, SupportId, SupportRecord, SupportSettlement,
};
pub use error::{CaisseError, ContributionGap, ValidationError};
pub use events::{CaisseEvent, EventPublisher, PublishError};
pub use policy::{CaissePolicy, GracePolicy, SupportPolicy};
pub use repository::{CaisseRepository, RepositoryError, Versioned};
pub use schedule::{PaymentClassification, ScheduledPeriod};
pub use support::{
    OffsetAuthorization, SupportEligibility, SupportEligibilityEngine, SupportRepayment,
};

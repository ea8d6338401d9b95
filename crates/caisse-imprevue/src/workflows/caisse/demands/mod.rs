//! Membership demands: submission, decision, reopening and conversion.

pub mod router;
pub mod service;
pub(crate) mod validation;
pub mod workflow;

pub use router::{demand_router, ACTOR_HEADER};
pub use service::DemandService;
pub use workflow::DemandWorkflow;

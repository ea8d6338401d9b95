//! Contract lifecycle from activation to closure.

pub mod lifecycle;
pub mod router;
pub mod service;

pub use lifecycle::{instantiate, ContractLifecycle, OverdueStatus, PaymentOutcome};
pub use router::contract_router;
pub use service::ContractService;

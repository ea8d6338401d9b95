//! Contract lifecycle and eligibility engine for the Caisse Imprévue (Volet Entraide) program.
//!
//! The [`workflows::caisse`] module holds the pure core: the demand state machine, the payment
//! schedule arithmetic and the support eligibility rules. [`config`], [`error`] and
//! [`telemetry`] provide the ambient pieces shared with the HTTP/CLI service.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::NaiveDate;
use serde_json::json;

use super::catalog::CatalogError;
use super::domain::{ContractId, DemandId, SupportId};
use super::repository::RepositoryError;

/// Malformed caller input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("cause must be between {min} and {max} characters (found {found})")]
    CauseLength { min: usize, max: usize, found: usize },
    #[error("reason must be at least {min} characters (found {found})")]
    ReasonTooShort { min: usize, found: usize },
    #[error("payment frequency '{0}' is not DAILY or MONTHLY")]
    InvalidFrequency(String),
    #[error("emergency contact incomplete, missing: {}", .missing.join(", "))]
    IncompleteEmergencyContact { missing: Vec<&'static str> },
    #[error("deletion confirmation does not match the demand id and member matricule")]
    ConfirmationMismatch,
    #[error("support amount {amount} outside tier bounds [{min}, {max}]")]
    SupportAmountOutOfRange { amount: u64, min: u64, max: u64 },
    #[error("payment date {date} falls outside the contract term")]
    PeriodOutsideTerm { date: NaiveDate },
    #[error("period {period_index} already has a recorded payment")]
    DuplicatePayment { period_index: u32 },
    #[error("period {period_index} is not part of a {duration}-period term")]
    PeriodIndexOutOfRange { period_index: u32, duration: u32 },
    #[error("penalty amount must be positive")]
    ZeroPenalty,
    #[error("unsettled penalties would reach {total}, above the nominal {nominal}")]
    PenaltiesExceedNominal { total: u64, nominal: u64 },
    #[error("period {period_index} already carries an unsettled penalty")]
    DuplicatePenalty { period_index: u32 },
    #[error("no unsettled penalty recorded for period {period_index}")]
    UnknownPenalty { period_index: u32 },
    #[error("offset authorization must name an authorizer and a reference")]
    IncompleteAuthorization,
}

/// Why a member's contributions block a support request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContributionGap {
    ForfeitedPeriod { period_index: u32, due_date: NaiveDate },
    CurrentPeriodUnpaid { period_index: u32, due_date: NaiveDate },
}

impl std::fmt::Display for ContributionGap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContributionGap::ForfeitedPeriod {
                period_index,
                due_date,
            } => write!(
                f,
                "period {period_index} due {due_date} is forfeited and not cleared"
            ),
            ContributionGap::CurrentPeriodUnpaid {
                period_index,
                due_date,
            } => write!(
                f,
                "current period {period_index} due {due_date} has no recorded contribution"
            ),
        }
    }
}

/// Every failure the demand workflow, schedule and support engine can report.
#[derive(Debug, thiserror::Error)]
pub enum CaisseError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("cannot {action} {entity} {id} while {status}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        action: &'static str,
        status: String,
    },
    #[error("demand {demand_id} already converted into contract {contract_id}")]
    AlreadyConverted {
        demand_id: DemandId,
        contract_id: ContractId,
    },
    #[error("not yet eligible for support: {}", waiting_period_hint(.eligible_on))]
    NotYetEligible { eligible_on: Option<NaiveDate> },
    #[error("contributions not current: {0}")]
    ContributionsNotCurrent(ContributionGap),
    #[error("support {support_id} is still outstanding")]
    SupportOutstanding { support_id: SupportId },
    #[error("support limit reached: {granted}/{limit} this year")]
    AnnualLimitReached { granted: u32, limit: u32 },
    #[error("a support was already granted in period {previous_period}; supports must not be consecutive")]
    ConsecutiveMonthViolation { previous_period: u32 },
    #[error("support {support_id} was due for repayment by {repay_by}")]
    OverdueSupport {
        support_id: SupportId,
        repay_by: NaiveDate,
    },
    #[error("outstanding support {outstanding} exceeds contributions paid {contributions_paid}")]
    UnsettledSupport {
        outstanding: u64,
        contributions_paid: u64,
    },
    #[error("{entity} {id} changed concurrently; gave up after {attempts} attempts")]
    ConcurrentModification {
        entity: &'static str,
        id: String,
        attempts: u32,
    },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn waiting_period_hint(eligible_on: &Option<NaiveDate>) -> String {
    match eligible_on {
        Some(date) => format!("waiting period ends on {date}"),
        None => "contract has no first payment date".to_string(),
    }
}

impl CaisseError {
    pub(crate) fn invalid_transition(
        entity: &'static str,
        id: impl ToString,
        action: &'static str,
        status: impl ToString,
    ) -> Self {
        Self::InvalidTransition {
            entity,
            id: id.to_string(),
            action,
            status: status.to_string(),
        }
    }

    /// Stable machine-readable error kind for API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            CaisseError::Validation(_) => "validation_error",
            CaisseError::InvalidTransition { .. } => "invalid_transition",
            CaisseError::AlreadyConverted { .. } => "already_converted",
            CaisseError::NotYetEligible { .. } => "not_yet_eligible",
            CaisseError::ContributionsNotCurrent(_) => "contributions_not_current",
            CaisseError::SupportOutstanding { .. } => "support_outstanding",
            CaisseError::AnnualLimitReached { .. } => "annual_limit_reached",
            CaisseError::ConsecutiveMonthViolation { .. } => "consecutive_month_violation",
            CaisseError::OverdueSupport { .. } => "overdue_support",
            CaisseError::UnsettledSupport { .. } => "unsettled_support",
            CaisseError::ConcurrentModification { .. } => "concurrent_modification",
            CaisseError::NotFound { .. } => "not_found",
            CaisseError::Catalog(CatalogError::UnknownTier(_)) => "validation_error",
            CaisseError::Catalog(_) => "catalog_error",
            CaisseError::Repository(_) => "repository_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CaisseError::Validation(_) | CaisseError::Catalog(CatalogError::UnknownTier(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            CaisseError::NotFound { .. } | CaisseError::Repository(RepositoryError::NotFound) => {
                StatusCode::NOT_FOUND
            }
            CaisseError::InvalidTransition { .. }
            | CaisseError::AlreadyConverted { .. }
            | CaisseError::NotYetEligible { .. }
            | CaisseError::ContributionsNotCurrent(_)
            | CaisseError::SupportOutstanding { .. }
            | CaisseError::AnnualLimitReached { .. }
            | CaisseError::ConsecutiveMonthViolation { .. }
            | CaisseError::OverdueSupport { .. }
            | CaisseError::UnsettledSupport { .. }
            | CaisseError::ConcurrentModification { .. }
            | CaisseError::Repository(RepositoryError::Conflict)
            | CaisseError::Repository(RepositoryError::VersionMismatch { .. }) => {
                StatusCode::CONFLICT
            }
            CaisseError::Repository(RepositoryError::Unavailable(_)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CaisseError::Catalog(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for CaisseError {
    fn into_response(self) -> Response {
        let payload = json!({
            "error": self.to_string(),
            "kind": self.kind(),
        });
        (self.status_code(), axum::Json(payload)).into_response()
    }
}

use serde::{Deserialize, Serialize};

pub const DEFAULT_GRACE_DAYS: i64 = 3;
pub const DEFAULT_PENALTY_DAYS: i64 = 7;
pub const DEFAULT_SUPPORT_WAITING_PERIODS: u32 = 3;
pub const DEFAULT_SUPPORT_ANNUAL_LIMIT: u32 = 6;
pub const DEFAULT_MIN_REASON_LENGTH: usize = 10;
pub const MIN_CAUSE_LENGTH: usize = 10;
pub const MAX_CAUSE_LENGTH: usize = 500;
pub const DEFAULT_MAX_WRITE_ATTEMPTS: u32 = 3;
pub const PERIODS_PER_MEMBERSHIP_YEAR: u32 = 12;

/// Days after a due date during which a contribution is still on time, then penalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GracePolicy {
    pub grace_days: i64,
    pub penalty_days: i64,
}

impl Default for GracePolicy {
    fn default() -> Self {
        Self {
            grace_days: DEFAULT_GRACE_DAYS,
            penalty_days: DEFAULT_PENALTY_DAYS,
        }
    }
}

/// Association rules gating support (appui) requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportPolicy {
    pub waiting_periods: u32,
    pub annual_limit: u32,
    pub periods_per_year: u32,
}

impl Default for SupportPolicy {
    fn default() -> Self {
        Self {
            waiting_periods: DEFAULT_SUPPORT_WAITING_PERIODS,
            annual_limit: DEFAULT_SUPPORT_ANNUAL_LIMIT,
            periods_per_year: PERIODS_PER_MEMBERSHIP_YEAR,
        }
    }
}

/// Every tunable policy value consumed by the demand and contract services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaissePolicy {
    pub grace: GracePolicy,
    pub support: SupportPolicy,
    pub min_reason_length: usize,
    pub min_cause_length: usize,
    pub max_cause_length: usize,
    pub max_write_attempts: u32,
}

impl Default for CaissePolicy {
    fn default() -> Self {
        Self {
            grace: GracePolicy::default(),
            support: SupportPolicy::default(),
            min_reason_length: DEFAULT_MIN_REASON_LENGTH,
            min_cause_length: MIN_CAUSE_LENGTH,
            max_cause_length: MAX_CAUSE_LENGTH,
            max_write_attempts: DEFAULT_MAX_WRITE_ATTEMPTS,
        }
    }
}

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::catalog::TierSnapshot;
use super::error::ValidationError;
use super::schedule::PaymentClassification;

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

record_id!(
    /// Identifier of a membership demand.
    DemandId
);
record_id!(
    /// Identifier of a Caisse Imprévue contract.
    ContractId
);
record_id!(
    /// Identifier of a support (appui) disbursement.
    SupportId
);
record_id!(
    /// Identifier of the member in the association registry.
    MemberId
);
record_id!(
    /// Back-office user or member performing an action.
    ActorId
);

/// How the member pays contributions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentFrequency {
    Daily,
    Monthly,
}

impl PaymentFrequency {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Monthly => "MONTHLY",
        }
    }
}

impl FromStr for PaymentFrequency {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Self::Daily),
            "MONTHLY" => Ok(Self::Monthly),
            _ => Err(ValidationError::InvalidFrequency(value.to_string())),
        }
    }
}

/// States of the demand state machine. `Converted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DemandStatus {
    Pending,
    Approved,
    Rejected,
    Reopened,
    Converted,
}

impl DemandStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Reopened => "REOPENED",
            Self::Converted => "CONVERTED",
        }
    }

    /// Pending and reopened demands both await a decision.
    pub const fn awaits_decision(self) -> bool {
        matches!(self, Self::Pending | Self::Reopened)
    }
}

impl fmt::Display for DemandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Active,
    Finished,
    Canceled,
}

impl ContractStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Finished => "FINISHED",
            Self::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Member identity denormalized for display without joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub matricule: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityDocumentType {
    NationalIdCard,
    Passport,
    ResidencePermit,
    DrivingLicense,
    Other,
}

/// Person to reach when the member cannot be contacted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyContact {
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub phone1: String,
    #[serde(default)]
    pub phone2: Option<String>,
    #[serde(default)]
    pub relationship: String,
    #[serde(default)]
    pub id_type: Option<IdentityDocumentType>,
    #[serde(default)]
    pub id_number: String,
    #[serde(default)]
    pub document_photo_url: Option<String>,
}

impl EmergencyContact {
    /// Names of the required fields that are still blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.last_name.trim().is_empty() {
            missing.push("lastName");
        }
        if self.phone1.trim().is_empty() {
            missing.push("phone1");
        }
        if self.relationship.trim().is_empty() {
            missing.push("relationship");
        }
        if self.id_type.is_none() {
            missing.push("idType");
        }
        if self.id_number.trim().is_empty() {
            missing.push("idNumber");
        }
        if self
            .document_photo_url
            .as_deref()
            .map_or(true, |url| url.trim().is_empty())
        {
            missing.push("documentPhotoUrl");
        }
        missing
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

/// A membership request moving through the demand workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Demand {
    pub id: DemandId,
    pub member_id: MemberId,
    pub member: MemberSnapshot,
    pub subscription_tier: TierSnapshot,
    pub payment_frequency: PaymentFrequency,
    pub desired_date: NaiveDate,
    pub cause: String,
    pub emergency_contact: Option<EmergencyContact>,
    pub status: DemandStatus,
    pub decision_reason: Option<String>,
    pub decision_made_at: Option<DateTime<Utc>>,
    pub decision_made_by: Option<ActorId>,
    pub reopen_reason: Option<String>,
    pub reopened_at: Option<DateTime<Utc>>,
    pub reopened_by: Option<ActorId>,
    pub contract_id: Option<ContractId>,
    pub created_at: DateTime<Utc>,
    pub created_by: ActorId,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied inputs for a new demand; the tier is resolved from the catalog by code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandSubmission {
    pub member_id: MemberId,
    pub member: MemberSnapshot,
    pub tier_code: String,
    pub payment_frequency: String,
    pub desired_date: NaiveDate,
    pub cause: String,
    #[serde(default)]
    pub emergency_contact: Option<EmergencyContact>,
}

/// Retyped demand id and member matricule confirming a deletion.
///
/// A usability safeguard against deleting the wrong demand; authorization remains the caller's
/// responsibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionConfirmation {
    pub demand_id: String,
    pub matricule: String,
}

/// How an outstanding support was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportSettlement {
    Repaid,
    NettedOnCancel,
    ForcedOffset,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportRecord {
    pub id: SupportId,
    pub granted_at: NaiveDate,
    pub amount: u64,
    pub repaid_at: Option<NaiveDate>,
    pub month_index_at_grant: u32,
    pub period_index: u32,
    pub repay_by: NaiveDate,
    pub settlement: Option<SupportSettlement>,
    pub settled_by: Option<ActorId>,
}

impl SupportRecord {
    pub fn is_outstanding(&self) -> bool {
        self.repaid_at.is_none()
    }
}

/// One scheduled period credited by a recorded contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub period_index: u32,
    pub due_date: NaiveDate,
    pub paid_at: NaiveDate,
    pub classification: PaymentClassification,
}

/// Penalty explicitly assessed by an authorized actor for a late period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PenaltyRecord {
    pub period_index: u32,
    pub amount: u64,
    pub assessed_at: NaiveDate,
    pub assessed_by: ActorId,
    pub settled_at: Option<NaiveDate>,
}

/// Figures handed to the refund/document subsystem when a contract completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalRefund {
    pub nominal: u64,
    pub unpaid_penalties: u64,
    pub amount: u64,
}

/// Figures handed to the refund/document subsystem when a contract is canceled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EarlyRefund {
    pub contributions_paid: u64,
    pub outstanding_support: u64,
    pub amount: u64,
}

/// An active, finished or canceled Caisse Imprévue contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub id: ContractId,
    pub demand_id: DemandId,
    pub member_id: MemberId,
    pub member: MemberSnapshot,
    pub emergency_contact: Option<EmergencyContact>,
    pub subscription_tier: TierSnapshot,
    pub payment_frequency: PaymentFrequency,
    pub first_payment_date: Option<NaiveDate>,
    pub signed_contract_document_id: Option<String>,
    pub total_months_paid: u32,
    pub payments: Vec<PaymentRecord>,
    pub penalties: Vec<PenaltyRecord>,
    pub status: ContractStatus,
    pub current_support_id: Option<SupportId>,
    pub support_history: Vec<SupportRecord>,
    pub final_refund: Option<FinalRefund>,
    pub early_refund: Option<EarlyRefund>,
    pub final_refund_document_id: Option<String>,
    pub early_refund_document_id: Option<String>,
    pub cancel_reason: Option<String>,
    pub canceled_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn current_support(&self) -> Option<&SupportRecord> {
        let id = self.current_support_id.as_ref()?;
        self.support_history.iter().find(|record| &record.id == id)
    }

    pub fn outstanding_support_amount(&self) -> u64 {
        self.current_support().map_or(0, |record| record.amount)
    }

    pub fn contributions_paid(&self) -> u64 {
        self.subscription_tier
            .amount_per_month
            .saturating_mul(u64::from(self.total_months_paid))
    }

    pub fn unsettled_penalties(&self) -> u64 {
        self.penalties
            .iter()
            .filter(|penalty| penalty.settled_at.is_none())
            .fold(0, |total: u64, penalty| total.saturating_add(penalty.amount))
    }

    pub fn payment_for_period(&self, period_index: u32) -> Option<&PaymentRecord> {
        self.payments
            .iter()
            .find(|payment| payment.period_index == period_index)
    }

    pub fn is_fully_paid(&self) -> bool {
        self.total_months_paid >= self.subscription_tier.duration_in_months
    }
}

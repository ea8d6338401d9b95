use std::collections::BTreeMap;
use std::io::Read;

use serde::{Deserialize, Serialize};

/// Whether a tier follows the `nominal = amount × duration` rule or carries explicit overrides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TierKind {
    Standard,
    Custom,
}

/// A forfait: the monthly contribution, nominal and support bounds of a subscription plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionTier {
    pub code: String,
    pub label: String,
    pub amount_per_month: u64,
    pub nominal: u64,
    pub duration_in_months: u32,
    pub support_min: u64,
    pub support_max: u64,
    pub kind: TierKind,
}

impl SubscriptionTier {
    pub fn standard(
        code: &str,
        label: &str,
        amount_per_month: u64,
        duration_in_months: u32,
        support_min: u64,
        support_max: u64,
    ) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
            amount_per_month,
            nominal: amount_per_month.saturating_mul(u64::from(duration_in_months)),
            duration_in_months,
            support_min,
            support_max,
            kind: TierKind::Standard,
        }
    }

    pub fn custom(
        code: &str,
        label: &str,
        amount_per_month: u64,
        duration_in_months: u32,
        nominal: u64,
        support_min: u64,
        support_max: u64,
    ) -> Self {
        Self {
            code: code.to_string(),
            label: label.to_string(),
            amount_per_month,
            nominal,
            duration_in_months,
            support_min,
            support_max,
            kind: TierKind::Custom,
        }
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.code.trim().is_empty() {
            return Err(CatalogError::InvalidTier {
                code: self.code.clone(),
                detail: "code must not be blank".to_string(),
            });
        }
        if self.amount_per_month == 0 || self.duration_in_months == 0 {
            return Err(CatalogError::InvalidTier {
                code: self.code.clone(),
                detail: "monthly amount and duration must be positive".to_string(),
            });
        }
        if self.support_min > self.support_max {
            return Err(CatalogError::InvalidTier {
                code: self.code.clone(),
                detail: format!(
                    "support minimum {} exceeds maximum {}",
                    self.support_min, self.support_max
                ),
            });
        }
        let expected = self
            .amount_per_month
            .checked_mul(u64::from(self.duration_in_months))
            .ok_or_else(|| CatalogError::InvalidTier {
                code: self.code.clone(),
                detail: "nominal overflows".to_string(),
            })?;
        if self.kind == TierKind::Standard && self.nominal != expected {
            return Err(CatalogError::InvalidTier {
                code: self.code.clone(),
                detail: format!(
                    "standard nominal must equal {} x {} = {expected}, found {}",
                    self.amount_per_month, self.duration_in_months, self.nominal
                ),
            });
        }
        Ok(())
    }

    pub fn snapshot(&self) -> TierSnapshot {
        TierSnapshot::from(self)
    }
}

/// Tier values frozen onto a demand at submission time and copied onto its contract.
///
/// Never recomputed from the live catalog, so a later tier change leaves existing demands and
/// contracts untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierSnapshot {
    pub code: String,
    pub label: String,
    pub amount_per_month: u64,
    pub nominal: u64,
    pub duration_in_months: u32,
    pub support_min: u64,
    pub support_max: u64,
}

impl From<&SubscriptionTier> for TierSnapshot {
    fn from(tier: &SubscriptionTier) -> Self {
        Self {
            code: tier.code.clone(),
            label: tier.label.clone(),
            amount_per_month: tier.amount_per_month,
            nominal: tier.nominal,
            duration_in_months: tier.duration_in_months,
            support_min: tier.support_min,
            support_max: tier.support_max,
        }
    }
}

/// Read access to subscription tiers.
pub trait TierSource: Send + Sync {
    fn get_tier(&self, code: &str) -> Result<SubscriptionTier, CatalogError>;
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("unknown subscription tier '{0}'")]
    UnknownTier(String),
    #[error("invalid subscription tier '{code}': {detail}")]
    InvalidTier { code: String, detail: String },
    #[error("duplicate subscription tier '{0}'")]
    DuplicateTier(String),
    #[error("unable to read tier catalog: {0}")]
    Csv(#[from] csv::Error),
}

/// Immutable reference data listing the forfaits offered by the association.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionCatalog {
    tiers: BTreeMap<String, SubscriptionTier>,
}

impl SubscriptionCatalog {
    pub fn new(tiers: Vec<SubscriptionTier>) -> Result<Self, CatalogError> {
        let mut indexed = BTreeMap::new();
        for tier in tiers {
            tier.validate()?;
            if indexed.contains_key(&tier.code) {
                return Err(CatalogError::DuplicateTier(tier.code));
            }
            indexed.insert(tier.code.clone(), tier);
        }
        Ok(Self { tiers: indexed })
    }

    /// The twelve-month forfaits published by the association.
    pub fn standard() -> Self {
        let tiers = [
            SubscriptionTier::standard("C", "Forfait C", 10_000, 12, 30_000, 100_000),
            SubscriptionTier::standard("D", "Forfait D", 20_000, 12, 60_000, 200_000),
            SubscriptionTier::standard("E", "Forfait E", 30_000, 12, 90_000, 300_000),
            SubscriptionTier::standard("F", "Forfait F", 40_000, 12, 120_000, 400_000),
            SubscriptionTier::standard("G", "Forfait G", 50_000, 12, 150_000, 500_000),
        ];
        Self {
            tiers: tiers
                .into_iter()
                .map(|tier| (tier.code.clone(), tier))
                .collect(),
        }
    }

    /// Loads tiers from CSV with the header
    /// `code,label,amount_per_month,duration_in_months,support_min,support_max,nominal`.
    /// An empty `nominal` column yields a standard tier.
    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut tiers = Vec::new();
        for row in csv_reader.deserialize::<TierRow>() {
            let row = row?;
            let tier = match row.nominal {
                Some(nominal) => SubscriptionTier::custom(
                    &row.code,
                    &row.label,
                    row.amount_per_month,
                    row.duration_in_months,
                    nominal,
                    row.support_min,
                    row.support_max,
                ),
                None => SubscriptionTier::standard(
                    &row.code,
                    &row.label,
                    row.amount_per_month,
                    row.duration_in_months,
                    row.support_min,
                    row.support_max,
                ),
            };
            tiers.push(tier);
        }

        Self::new(tiers)
    }

    pub fn tiers(&self) -> impl Iterator<Item = &SubscriptionTier> {
        self.tiers.values()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

impl TierSource for SubscriptionCatalog {
    fn get_tier(&self, code: &str) -> Result<SubscriptionTier, CatalogError> {
        self.tiers
            .get(code.trim())
            .cloned()
            .ok_or_else(|| CatalogError::UnknownTier(code.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct TierRow {
    code: String,
    label: String,
    amount_per_month: u64,
    duration_in_months: u32,
    support_min: u64,
    support_max: u64,
    #[serde(default)]
    nominal: Option<u64>,
}

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{Contract, ContractId, Demand, DemandId};
use super::error::CaisseError;

/// A stored record and the version its next conditional write must present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Versioned<T> {
    pub version: u64,
    pub record: T,
}

impl<T> Versioned<T> {
    pub fn new(version: u64, record: T) -> Self {
        Self { version, record }
    }
}

/// Document store holding demands and contracts.
///
/// Saves are conditional on `expected_version`; a mismatch returns
/// [`RepositoryError::VersionMismatch`] and leaves the stored document untouched.
pub trait CaisseRepository: Send + Sync {
    fn insert_demand(&self, demand: Demand) -> Result<Versioned<Demand>, RepositoryError>;
    fn fetch_demand(&self, id: &DemandId) -> Result<Option<Versioned<Demand>>, RepositoryError>;
    fn save_demand(&self, demand: Demand, expected_version: u64) -> Result<u64, RepositoryError>;
    fn delete_demand(&self, id: &DemandId, expected_version: u64) -> Result<(), RepositoryError>;

    fn fetch_contract(
        &self,
        id: &ContractId,
    ) -> Result<Option<Versioned<Contract>>, RepositoryError>;
    fn save_contract(
        &self,
        contract: Contract,
        expected_version: u64,
    ) -> Result<u64, RepositoryError>;
    fn delete_contract(&self, id: &ContractId, expected_version: u64)
        -> Result<(), RepositoryError>;
    fn contracts(&self) -> Result<Vec<Versioned<Contract>>, RepositoryError>;

    /// Marks the demand converted and creates its contract as a single atomic write.
    ///
    /// Either both documents are written or neither is.
    fn commit_conversion(
        &self,
        demand: Demand,
        expected_version: u64,
        contract: Contract,
    ) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, stored version {found}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Runs a read-validate-write cycle, repeating it while the conditional write loses a race.
///
/// Only version mismatches are retried; business-rule failures surface immediately. After
/// `max_attempts` stale writes the caller receives `ConcurrentModification`.
pub(crate) fn with_retry<T, F>(
    entity: &'static str,
    id: &str,
    max_attempts: u32,
    mut cycle: F,
) -> Result<T, CaisseError>
where
    F: FnMut() -> Result<T, CaisseError>,
{
    let max_attempts = max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match cycle() {
            Err(CaisseError::Repository(RepositoryError::VersionMismatch { expected, found })) => {
                debug!(entity, id, attempt, expected, found, "stale write, retrying");
            }
            outcome => return outcome,
        }
    }

    Err(CaisseError::ConcurrentModification {
        entity,
        id: id.to_string(),
        attempts: max_attempts,
    })
}

use caisse_imprevue::error::AppError;
use caisse_imprevue::workflows::caisse::{
    CaisseEvent, CaisseRepository, Contract, ContractId, Demand, DemandId, EventPublisher,
    PublishError, RepositoryError, SubscriptionCatalog, Versioned,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) catalog: Arc<SubscriptionCatalog>,
}

#[derive(Default)]
struct Documents {
    demands: HashMap<DemandId, Versioned<Demand>>,
    contracts: HashMap<ContractId, Versioned<Contract>>,
}

/// Process-local document store with versioned conditional writes.
#[derive(Default, Clone)]
pub(crate) struct InMemoryCaisseRepository {
    documents: Arc<Mutex<Documents>>,
}

fn check_version(found: u64, expected: u64) -> Result<(), RepositoryError> {
    if found == expected {
        Ok(())
    } else {
        Err(RepositoryError::VersionMismatch { expected, found })
    }
}

impl CaisseRepository for InMemoryCaisseRepository {
    fn insert_demand(&self, demand: Demand) -> Result<Versioned<Demand>, RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        if guard.demands.contains_key(&demand.id) {
            return Err(RepositoryError::Conflict);
        }
        let stored = Versioned::new(1, demand);
        guard
            .demands
            .insert(stored.record.id.clone(), stored.clone());
        Ok(stored)
    }

    fn fetch_demand(&self, id: &DemandId) -> Result<Option<Versioned<Demand>>, RepositoryError> {
        let guard = self.documents.lock().expect("repository mutex poisoned");
        Ok(guard.demands.get(id).cloned())
    }

    fn save_demand(&self, demand: Demand, expected_version: u64) -> Result<u64, RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        let stored = guard
            .demands
            .get_mut(&demand.id)
            .ok_or(RepositoryError::NotFound)?;
        check_version(stored.version, expected_version)?;
        stored.version += 1;
        stored.record = demand;
        Ok(stored.version)
    }

    fn delete_demand(&self, id: &DemandId, expected_version: u64) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        let found = guard
            .demands
            .get(id)
            .ok_or(RepositoryError::NotFound)?
            .version;
        check_version(found, expected_version)?;
        guard.demands.remove(id);
        Ok(())
    }

    fn fetch_contract(
        &self,
        id: &ContractId,
    ) -> Result<Option<Versioned<Contract>>, RepositoryError> {
        let guard = self.documents.lock().expect("repository mutex poisoned");
        Ok(guard.contracts.get(id).cloned())
    }

    fn save_contract(
        &self,
        contract: Contract,
        expected_version: u64,
    ) -> Result<u64, RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        let stored = guard
            .contracts
            .get_mut(&contract.id)
            .ok_or(RepositoryError::NotFound)?;
        check_version(stored.version, expected_version)?;
        stored.version += 1;
        stored.record = contract;
        Ok(stored.version)
    }

    fn delete_contract(
        &self,
        id: &ContractId,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        let found = guard
            .contracts
            .get(id)
            .ok_or(RepositoryError::NotFound)?
            .version;
        check_version(found, expected_version)?;
        guard.contracts.remove(id);
        Ok(())
    }

    fn contracts(&self) -> Result<Vec<Versioned<Contract>>, RepositoryError> {
        let guard = self.documents.lock().expect("repository mutex poisoned");
        let mut contracts: Vec<_> = guard.contracts.values().cloned().collect();
        contracts.sort_by(|left, right| left.record.id.cmp(&right.record.id));
        Ok(contracts)
    }

    fn commit_conversion(
        &self,
        demand: Demand,
        expected_version: u64,
        contract: Contract,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.documents.lock().expect("repository mutex poisoned");
        let found = guard
            .demands
            .get(&demand.id)
            .ok_or(RepositoryError::NotFound)?
            .version;
        check_version(found, expected_version)?;
        if guard.contracts.contains_key(&contract.id) {
            return Err(RepositoryError::Conflict);
        }
        guard
            .contracts
            .insert(contract.id.clone(), Versioned::new(1, contract));
        guard
            .demands
            .insert(demand.id.clone(), Versioned::new(found + 1, demand));
        Ok(())
    }
}

/// Logs every committed event as structured JSON.
#[derive(Default, Clone, Copy)]
pub(crate) struct TracingEventPublisher;

impl EventPublisher for TracingEventPublisher {
    fn publish(&self, event: CaisseEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(&event)
            .map_err(|err| PublishError::Transport(err.to_string()))?;
        info!(event = event.name(), %payload, "caisse event");
        Ok(())
    }
}

/// Logs like [`TracingEventPublisher`] and keeps a copy of each event for the demo transcript.
#[derive(Default, Clone)]
pub(crate) struct RecordingEventPublisher {
    events: Arc<Mutex<Vec<CaisseEvent>>>,
}

impl EventPublisher for RecordingEventPublisher {
    fn publish(&self, event: CaisseEvent) -> Result<(), PublishError> {
        TracingEventPublisher.publish(event.clone())?;
        self.events
            .lock()
            .map_err(|_| PublishError::Transport("event log poisoned".to_string()))?
            .push(event);
        Ok(())
    }
}

impl RecordingEventPublisher {
    pub(crate) fn events(&self) -> Vec<CaisseEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

/// The published forfaits, or the tiers listed in a CSV export when a path is given.
pub(crate) fn load_catalog(path: Option<&Path>) -> Result<SubscriptionCatalog, AppError> {
    match path {
        Some(path) => {
            let file = File::open(path)?;
            let catalog = SubscriptionCatalog::from_csv_reader(file)?;
            info!(path = %path.display(), tiers = catalog.len(), "tier catalog loaded");
            Ok(catalog)
        }
        None => Ok(SubscriptionCatalog::standard()),
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

pub(crate) fn deserialize_optional_date<'de, D>(
    deserializer: D,
) -> Result<Option<NaiveDate>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    opt.map(|value| parse_date(&value).map_err(serde::de::Error::custom))
        .transpose()
}

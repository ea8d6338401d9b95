use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::Value;

use crate::workflows::caisse::catalog::{SubscriptionCatalog, TierSource};
use crate::workflows::caisse::contracts::lifecycle::{self, ContractLifecycle};
use crate::workflows::caisse::contracts::ContractService;
use crate::workflows::caisse::demands::{DemandService, DemandWorkflow};
use crate::workflows::caisse::domain::{
    ActorId, Contract, ContractId, Demand, DemandId, DemandSubmission, EmergencyContact,
    IdentityDocumentType, MemberId, MemberSnapshot,
};
use crate::workflows::caisse::events::{CaisseEvent, EventPublisher, PublishError};
use crate::workflows::caisse::policy::CaissePolicy;
use crate::workflows::caisse::repository::{CaisseRepository, RepositoryError, Versioned};

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn actor() -> ActorId {
    ActorId::from("agent-bo-01")
}

pub(super) fn member() -> MemberSnapshot {
    MemberSnapshot {
        matricule: "MK-2024-0117".to_string(),
        first_name: "Jean".to_string(),
        last_name: "Ndong".to_string(),
        phones: vec!["+241 07 11 22 33".to_string()],
        email: Some("jean.ndong@example.org".to_string()),
        photo_url: None,
    }
}

pub(super) fn complete_contact() -> EmergencyContact {
    EmergencyContact {
        last_name: "Ndong".to_string(),
        first_name: Some("Marie".to_string()),
        phone1: "+241 06 44 55 66".to_string(),
        phone2: None,
        relationship: "Épouse".to_string(),
        id_type: Some(IdentityDocumentType::Passport),
        id_number: "P-778812".to_string(),
        document_photo_url: Some("contacts/p-778812.jpg".to_string()),
    }
}

pub(super) fn submission(tier_code: &str) -> DemandSubmission {
    DemandSubmission {
        member_id: MemberId::from("member-0117"),
        member: member(),
        tier_code: tier_code.to_string(),
        payment_frequency: "MONTHLY".to_string(),
        desired_date: date(2024, 1, 10),
        cause: "Prévoyance pour les frais médicaux de la famille".to_string(),
        emergency_contact: Some(complete_contact()),
    }
}

pub(super) const REASON: &str = "Dossier complet et vérifié";

/// Demand built directly through the pure workflow, for state-machine tests.
pub(super) fn pending_demand() -> Demand {
    let catalog = SubscriptionCatalog::standard();
    let tier = catalog.get_tier("C").expect("standard tier");
    DemandWorkflow::default()
        .submit(
            DemandId::from("DEM-TEST-1"),
            submission("C"),
            tier.snapshot(),
            &actor(),
            timestamp(),
        )
        .expect("valid submission")
}

pub(super) fn timestamp() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 5, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

/// Unactivated ACTIVE contract instantiated from a pending demand snapshot.
pub(super) fn contract() -> Contract {
    lifecycle::instantiate(
        &pending_demand(),
        ContractId::from("CTR-TEST-1"),
        timestamp(),
    )
}

/// Contract activated on `first` with periods `1..=paid` paid on their due dates.
pub(super) fn contract_paid_through(first: NaiveDate, paid: u32) -> Contract {
    let lifecycle = ContractLifecycle::default();
    let mut contract = contract();
    lifecycle
        .activate(&mut contract, first, None, timestamp())
        .expect("activates");
    for offset in 0..paid {
        let due = crate::workflows::caisse::schedule::shift_months(first, offset);
        lifecycle
            .record_payment(&mut contract, due, due, timestamp())
            .expect("payment recorded");
    }
    contract
}

type WriteHook = Box<dyn FnOnce(&mut Store) + Send>;

#[derive(Default)]
pub(super) struct Store {
    pub demands: HashMap<DemandId, Versioned<Demand>>,
    pub contracts: HashMap<ContractId, Versioned<Contract>>,
}

/// Versioned in-memory store. A hook registered with [`MemoryRepository::before_next_write`]
/// runs right before the next conditional write, standing in for a concurrent writer.
#[derive(Clone, Default)]
pub(super) struct MemoryRepository {
    store: Arc<Mutex<Store>>,
    hook: Arc<Mutex<Option<WriteHook>>>,
}

impl MemoryRepository {
    pub fn before_next_write(&self, hook: impl FnOnce(&mut Store) + Send + 'static) {
        *self.hook.lock().expect("hook mutex poisoned") = Some(Box::new(hook));
    }

    pub fn contract_count(&self) -> usize {
        self.store
            .lock()
            .expect("repository mutex poisoned")
            .contracts
            .len()
    }

    pub fn stored_contract(&self, id: &ContractId) -> Option<Contract> {
        self.store
            .lock()
            .expect("repository mutex poisoned")
            .contracts
            .get(id)
            .map(|stored| stored.record.clone())
    }

    fn write<T>(&self, apply: impl FnOnce(&mut Store) -> T) -> T {
        let mut store = self.store.lock().expect("repository mutex poisoned");
        if let Some(hook) = self.hook.lock().expect("hook mutex poisoned").take() {
            hook(&mut *store);
        }
        apply(&mut *store)
    }
}

fn check_version(stored: u64, expected: u64) -> Result<(), RepositoryError> {
    if stored == expected {
        Ok(())
    } else {
        Err(RepositoryError::VersionMismatch {
            expected,
            found: stored,
        })
    }
}

impl CaisseRepository for MemoryRepository {
    fn insert_demand(&self, demand: Demand) -> Result<Versioned<Demand>, RepositoryError> {
        self.write(|store| {
            if store.demands.contains_key(&demand.id) {
                return Err(RepositoryError::Conflict);
            }
            let stored = Versioned::new(1, demand);
            store.demands.insert(stored.record.id.clone(), stored.clone());
            Ok(stored)
        })
    }

    fn fetch_demand(&self, id: &DemandId) -> Result<Option<Versioned<Demand>>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.demands.get(id).cloned())
    }

    fn save_demand(&self, demand: Demand, expected_version: u64) -> Result<u64, RepositoryError> {
        self.write(|store| {
            let stored = store
                .demands
                .get_mut(&demand.id)
                .ok_or(RepositoryError::NotFound)?;
            check_version(stored.version, expected_version)?;
            stored.version += 1;
            stored.record = demand;
            Ok(stored.version)
        })
    }

    fn delete_demand(&self, id: &DemandId, expected_version: u64) -> Result<(), RepositoryError> {
        self.write(|store| {
            let stored = store.demands.get(id).ok_or(RepositoryError::NotFound)?;
            check_version(stored.version, expected_version)?;
            store.demands.remove(id);
            Ok(())
        })
    }

    fn fetch_contract(
        &self,
        id: &ContractId,
    ) -> Result<Option<Versioned<Contract>>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.contracts.get(id).cloned())
    }

    fn save_contract(
        &self,
        contract: Contract,
        expected_version: u64,
    ) -> Result<u64, RepositoryError> {
        self.write(|store| {
            let stored = store
                .contracts
                .get_mut(&contract.id)
                .ok_or(RepositoryError::NotFound)?;
            check_version(stored.version, expected_version)?;
            stored.version += 1;
            stored.record = contract;
            Ok(stored.version)
        })
    }

    fn delete_contract(
        &self,
        id: &ContractId,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        self.write(|store| {
            let stored = store.contracts.get(id).ok_or(RepositoryError::NotFound)?;
            check_version(stored.version, expected_version)?;
            store.contracts.remove(id);
            Ok(())
        })
    }

    fn contracts(&self) -> Result<Vec<Versioned<Contract>>, RepositoryError> {
        let store = self.store.lock().expect("repository mutex poisoned");
        Ok(store.contracts.values().cloned().collect())
    }

    fn commit_conversion(
        &self,
        demand: Demand,
        expected_version: u64,
        contract: Contract,
    ) -> Result<(), RepositoryError> {
        self.write(|store| {
            let stored = store
                .demands
                .get(&demand.id)
                .ok_or(RepositoryError::NotFound)?;
            check_version(stored.version, expected_version)?;
            if store.contracts.contains_key(&contract.id) {
                return Err(RepositoryError::Conflict);
            }
            let version = stored.version + 1;
            store
                .contracts
                .insert(contract.id.clone(), Versioned::new(1, contract));
            store
                .demands
                .insert(demand.id.clone(), Versioned::new(version, demand));
            Ok(())
        })
    }
}

/// Store that is never reachable.
pub(super) struct UnavailableRepository;

impl UnavailableRepository {
    fn down<T>() -> Result<T, RepositoryError> {
        Err(RepositoryError::Unavailable("document store offline".to_string()))
    }
}

impl CaisseRepository for UnavailableRepository {
    fn insert_demand(&self, _demand: Demand) -> Result<Versioned<Demand>, RepositoryError> {
        Self::down()
    }

    fn fetch_demand(&self, _id: &DemandId) -> Result<Option<Versioned<Demand>>, RepositoryError> {
        Self::down()
    }

    fn save_demand(&self, _demand: Demand, _expected: u64) -> Result<u64, RepositoryError> {
        Self::down()
    }

    fn delete_demand(&self, _id: &DemandId, _expected: u64) -> Result<(), RepositoryError> {
        Self::down()
    }

    fn fetch_contract(
        &self,
        _id: &ContractId,
    ) -> Result<Option<Versioned<Contract>>, RepositoryError> {
        Self::down()
    }

    fn save_contract(&self, _contract: Contract, _expected: u64) -> Result<u64, RepositoryError> {
        Self::down()
    }

    fn delete_contract(&self, _id: &ContractId, _expected: u64) -> Result<(), RepositoryError> {
        Self::down()
    }

    fn contracts(&self) -> Result<Vec<Versioned<Contract>>, RepositoryError> {
        Self::down()
    }

    fn commit_conversion(
        &self,
        _demand: Demand,
        _expected: u64,
        _contract: Contract,
    ) -> Result<(), RepositoryError> {
        Self::down()
    }
}

#[derive(Clone, Default)]
pub(super) struct MemoryEvents {
    published: Arc<Mutex<Vec<CaisseEvent>>>,
}

impl MemoryEvents {
    pub fn names(&self) -> Vec<&'static str> {
        self.published
            .lock()
            .expect("events mutex poisoned")
            .iter()
            .map(CaisseEvent::name)
            .collect()
    }

    pub fn events(&self) -> Vec<CaisseEvent> {
        self.published
            .lock()
            .expect("events mutex poisoned")
            .clone()
    }
}

impl EventPublisher for MemoryEvents {
    fn publish(&self, event: CaisseEvent) -> Result<(), PublishError> {
        self.published
            .lock()
            .expect("events mutex poisoned")
            .push(event);
        Ok(())
    }
}

/// Publisher whose transport is down.
pub(super) struct FailingEvents;

impl EventPublisher for FailingEvents {
    fn publish(&self, _event: CaisseEvent) -> Result<(), PublishError> {
        Err(PublishError::Transport("broker unreachable".to_string()))
    }
}

pub(super) fn catalog() -> Arc<dyn TierSource> {
    Arc::new(SubscriptionCatalog::standard())
}

pub(super) struct Harness {
    pub demands: Arc<DemandService<MemoryRepository, MemoryEvents>>,
    pub contracts: Arc<ContractService<MemoryRepository, MemoryEvents>>,
    pub repository: MemoryRepository,
    pub events: MemoryEvents,
}

pub(super) fn harness() -> Harness {
    harness_with_catalog(catalog())
}

pub(super) fn harness_with_catalog(catalog: Arc<dyn TierSource>) -> Harness {
    let repository = MemoryRepository::default();
    let events = MemoryEvents::default();
    let shared_repository = Arc::new(repository.clone());
    let shared_events = Arc::new(events.clone());
    Harness {
        demands: Arc::new(DemandService::new(
            catalog,
            shared_repository.clone(),
            shared_events.clone(),
            CaissePolicy::default(),
        )),
        contracts: Arc::new(ContractService::new(
            shared_repository,
            shared_events,
            CaissePolicy::default(),
        )),
        repository,
        events,
    }
}

impl Harness {
    /// Submits, approves and converts a demand for the given tier.
    pub fn converted_contract(&self, tier_code: &str) -> Contract {
        let demand = self
            .demands
            .submit(submission(tier_code), &actor())
            .expect("submitted");
        self.demands
            .approve(&demand.record.id, REASON, &actor())
            .expect("approved");
        self.demands
            .convert(&demand.record.id)
            .expect("converted")
    }
}

pub(super) async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

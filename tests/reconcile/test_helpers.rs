//! Shared fixtures for reconciliation BDD scenarios.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rstest::fixture;
use stowage::storage::{ContractId, ResourceId};
use stowage::test_support::FakeStorageService;
use stowage::{CreateError, ReconcileContext, ReconcileError, StorageReconciler, UpdateReport};

pub type FakeReconciler = StorageReconciler<FakeStorageService, FakeStorageService>;

#[derive(Clone, Debug)]
pub enum PassOutcome {
    Created(ResourceId),
    CreateFailed(CreateError),
    Updated(UpdateReport),
    UpdateFailed(ReconcileError),
    Deleted,
    DeleteFailed(ReconcileError),
}

#[derive(Debug)]
pub struct Service {
    pub fake: FakeStorageService,
    pub reconciler: FakeReconciler,
    pub ctx: ReconcileContext,
}

#[derive(Debug, Default)]
struct Scratch {
    service: Option<Arc<Service>>,
    resource_id: Option<ResourceId>,
    outcome: Option<PassOutcome>,
}

/// World shared by every step of a scenario.
#[derive(Clone, Debug, Default)]
pub struct ReconcileWorld {
    scratch: Arc<Mutex<Scratch>>,
}

impl ReconcileWorld {
    fn lock(&self) -> MutexGuard<'_, Scratch> {
        self.scratch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn start_service(&self, contract: &str) {
        let contract_id = ContractId::from(contract);
        let fake = FakeStorageService::new(contract_id.clone());
        let reconciler = StorageReconciler::new(fake.clone(), fake.clone());
        self.lock().service = Some(Arc::new(Service {
            fake,
            reconciler,
            ctx: ReconcileContext::new(contract_id),
        }));
    }

    pub fn service(&self) -> Arc<Service> {
        self.lock()
            .service
            .clone()
            .unwrap_or_else(|| panic!("test setup requires a storage service"))
    }

    pub fn set_resource(&self, resource_id: ResourceId) {
        self.lock().resource_id = Some(resource_id);
    }

    pub fn resource(&self) -> ResourceId {
        self.lock()
            .resource_id
            .clone()
            .unwrap_or_else(|| panic!("test setup requires seeded storage"))
    }

    pub fn set_outcome(&self, outcome: PassOutcome) {
        self.lock().outcome = Some(outcome);
    }

    pub fn outcome(&self) -> Option<PassOutcome> {
        self.lock().outcome.clone()
    }
}

#[fixture]
pub fn reconcile_world() -> ReconcileWorld {
    ReconcileWorld::default()
}

//! Unit tests for reconciliation passes against the in-memory service.


use super::{ReconcileContext, StorageReconciler};
use crate::storage::{ContractId, ServerId, StorageDescriptor};
use crate::test_support::FakeStorageService;
use rstest::fixture;

const CONTRACT: &str = "gis00000001";
const SERVER: &str = "ivm00000001";

type FakeReconciler = StorageReconciler<FakeStorageService, FakeStorageService>;

struct Harness {
    fake: FakeStorageService,
    reconciler: FakeReconciler,
    ctx: ReconcileContext,
}

impl Harness {
    fn seed_attached(&self, descriptor: &StorageDescriptor) -> crate::storage::ResourceId {
        let id = self.fake.seed(descriptor);
        self.fake.attach(&id, &ServerId::from(SERVER));
        id
    }
}

#[fixture]
fn harness() -> Harness {
    let fake = FakeStorageService::new(ContractId::from(CONTRACT));
    let reconciler = StorageReconciler::new(fake.clone(), fake.clone());
    Harness {
        fake,
        reconciler,
        ctx: ReconcileContext::new(ContractId::from(CONTRACT)),
    }
}

#[rstest::rstest]
fn import_adopts_identifier_verbatim(harness: Harness) {
    let id = FakeReconciler::import(" iba00000042 ");
    assert_eq!(id.as_str(), " iba00000042 ");
    assert!(harness.fake.events().is_empty());
}

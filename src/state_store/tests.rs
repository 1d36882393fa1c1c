//! Tests for the state file.

use super::*;
use crate::storage::{ContractId, MutableField, ServerId, StorageDescriptor};
use crate::test_support::FakeStorageService;
use crate::{ReconcileContext, StorageReconciler};
use rstest::{fixture, rstest};
use tempfile::TempDir;

struct StoreFixture {
    _tmp: TempDir,
    path: Utf8PathBuf,
    store: StateStore,
}

#[fixture]
fn store_fixture() -> StoreFixture {
    let tmp = TempDir::new().unwrap_or_else(|err| panic!("tempdir: {err}"));
    let path = Utf8PathBuf::from_path_buf(tmp.path().join("state").join("stowage-state.json"))
        .unwrap_or_else(|err| panic!("temp path should be utf8: {}", err.display()));
    let store = StateStore::new(path.clone());
    StoreFixture {
        _tmp: tmp,
        path,
        store,
    }
}

fn descriptor() -> StorageDescriptor {
    StorageDescriptor::new("SX100")
        .storage_group("Z")
        .label("web")
        .encryption("Yes")
        .root_ssh_key("ssh-ed25519 AAAA")
        .root_password("hunter2")
        .user_data("#cloud-config")
}

#[rstest]
fn missing_file_loads_as_empty_state(store_fixture: StoreFixture) {
    let state = store_fixture
        .store
        .load()
        .unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(state, StateFile::default());
}

#[rstest]
fn record_round_trips_without_secrets(store_fixture: StoreFixture) {
    let id = ResourceId::from("iba00000001");
    store_fixture
        .store
        .record(&id, &StateRecord::new(&descriptor()))
        .unwrap_or_else(|err| panic!("record: {err}"));

    let recorded = store_fixture
        .store
        .get(&id)
        .unwrap_or_else(|err| panic!("get: {err}"))
        .unwrap_or_else(|| panic!("record should exist"));

    assert_eq!(recorded.descriptor, descriptor().without_secrets());
    assert_eq!(recorded.descriptor.label.as_deref(), Some("web"));
    assert!(recorded.secret_fingerprints.is_empty());
}

#[rstest]
fn secrets_never_reach_disk(store_fixture: StoreFixture) {
    let record =
        StateRecord::new(&descriptor()).with_applied_secrets(&descriptor(), MutableField::ALL);
    store_fixture
        .store
        .record(&ResourceId::from("iba00000001"), &record)
        .unwrap_or_else(|err| panic!("record: {err}"));

    let raw = std::fs::read_to_string(store_fixture.path.as_std_path())
        .unwrap_or_else(|err| panic!("read raw state: {err}"));

    assert!(raw.contains("\"resources\""), "unexpected layout: {raw}");
    assert!(raw.contains("\"type\": \"SX100\""), "unexpected layout: {raw}");
    assert!(raw.contains(&fingerprint("hunter2")), "fingerprint missing: {raw}");
    for secret in ["ssh-ed25519", "hunter2", "cloud-config"] {
        assert!(!raw.contains(secret), "secret {secret} leaked: {raw}");
    }
}

#[rstest]
fn forget_removes_only_the_named_record(store_fixture: StoreFixture) {
    let kept = ResourceId::from("iba00000001");
    let dropped = ResourceId::from("iba00000002");
    for id in [&kept, &dropped] {
        store_fixture
            .store
            .record(id, &StateRecord::new(&StorageDescriptor::new("S100")))
            .unwrap_or_else(|err| panic!("record: {err}"));
    }

    let removed = store_fixture
        .store
        .forget(&dropped)
        .unwrap_or_else(|err| panic!("forget: {err}"));
    let again = store_fixture
        .store
        .forget(&dropped)
        .unwrap_or_else(|err| panic!("forget: {err}"));

    assert!(removed);
    assert!(!again);
    let state = store_fixture
        .store
        .load()
        .unwrap_or_else(|err| panic!("load: {err}"));
    assert_eq!(state.resources.keys().collect::<Vec<_>>(), vec![&kept]);
}

#[rstest]
fn corrupt_file_reports_parse_error(store_fixture: StoreFixture) {
    store_fixture
        .store
        .record(
            &ResourceId::from("iba00000001"),
            &StateRecord::new(&StorageDescriptor::new("S100")),
        )
        .unwrap_or_else(|err| panic!("record: {err}"));
    std::fs::write(store_fixture.path.as_std_path(), "{not json")
        .unwrap_or_else(|err| panic!("corrupt state: {err}"));

    let Err(err) = store_fixture.store.load() else {
        panic!("corrupt state should fail to load");
    };

    assert!(
        matches!(err, StateStoreError::Parse { ref path, .. } if *path == store_fixture.path),
        "unexpected error: {err}"
    );
}

#[test]
fn path_without_filename_is_rejected() {
    let store = StateStore::new("/");
    let Err(err) = store.load() else {
        panic!("root path should be rejected");
    };
    assert!(
        matches!(err, StateStoreError::InvalidPath { .. }),
        "unexpected error: {err}"
    );
}

#[test]
fn fingerprint_is_stable_hex_sha256() {
    assert_eq!(
        fingerprint("abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
}

#[test]
fn previous_matches_unchanged_secret_and_flags_changed_ones() {
    let applied = StorageDescriptor::new("S100")
        .root_password("hunter2")
        .user_data("#cloud-config");
    let record = StateRecord::new(&applied).with_applied_secrets(&applied, MutableField::ALL);

    let same = record.previous_for(&applied);
    assert!(applied.changes_from(&same).is_empty());

    let rotated = StorageDescriptor::new("S100")
        .root_password("hunter3")
        .user_data("#cloud-config");
    let changes = rotated.changes_from(&record.previous_for(&rotated));
    assert_eq!(changes.iter().collect::<Vec<_>>(), vec![MutableField::RootPassword]);

    let cleared = StorageDescriptor::new("S100").user_data("#cloud-config");
    let changes = cleared.changes_from(&record.previous_for(&cleared));
    assert_eq!(changes.iter().collect::<Vec<_>>(), vec![MutableField::RootPassword]);
}

#[test]
fn refreshed_keeps_fingerprints_and_source_image() {
    let image = crate::storage::SourceImage {
        owner_contract_id: ContractId::from("gis00000001"),
        archive_id: crate::storage::ArchiveId::from("iar00000001"),
        image_id: crate::storage::ImageId::from("img00000001"),
    };
    let declared = StorageDescriptor::new("S100")
        .root_password("hunter2")
        .source_image(image.clone());
    let record = StateRecord::new(&declared).with_applied_secrets(&declared, MutableField::ALL);

    let refreshed = record.refreshed(&StorageDescriptor::new("S100").label("db"));

    assert_eq!(refreshed.descriptor.source_image, Some(image));
    assert_eq!(refreshed.descriptor.label.as_deref(), Some("db"));
    assert_eq!(refreshed.secret_fingerprints, record.secret_fingerprints);
}

#[rstest]
#[tokio::test]
async fn repeated_identical_update_is_a_noop(store_fixture: StoreFixture) {
    let contract = ContractId::from("gis00000001");
    let fake = FakeStorageService::new(contract.clone());
    let reconciler = StorageReconciler::new(fake.clone(), fake.clone());
    let ctx = ReconcileContext::new(contract);
    let server = ServerId::from("ivm00000001");
    let recorded = StorageDescriptor::new("S100").label("web");
    let id = fake.seed(&recorded);
    fake.attach(&id, &server);
    store_fixture
        .store
        .record(&id, &StateRecord::new(&recorded))
        .unwrap_or_else(|err| panic!("record: {err}"));
    let desired = recorded.clone().root_password("hunter2");

    let mut cycles = Vec::new();
    for _ in 0..3 {
        let record = store_fixture
            .store
            .get(&id)
            .unwrap_or_else(|err| panic!("get: {err}"))
            .unwrap_or_else(|| panic!("record should exist"));
        let previous = record.previous_for(&desired);
        let report = reconciler
            .update(&ctx, &id, &previous, &desired)
            .await
            .unwrap_or_else(|err| panic!("update: {err}"));
        store_fixture
            .store
            .record(&id, &record.after_update(&desired, &report))
            .unwrap_or_else(|err| panic!("record: {err}"));
        cycles.push(report.power_cycled);
    }

    assert_eq!(cycles, vec![true, false, false]);
    assert_eq!(fake.power_transitions().len(), 2);
    assert_eq!(fake.count("set-password"), 1);
}

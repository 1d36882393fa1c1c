//! BDD step definitions for reconciliation passes.

use rstest_bdd_macros::{given, then, when};
use stowage::api::PowerState;
use stowage::storage::{ArchiveId, ContractId, ImageId, ServerId, SourceImage};
use stowage::{ReconcileError, StorageDescriptor};
use tokio::runtime::Runtime;

use super::test_helpers::{PassOutcome, ReconcileWorld};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
}

fn runtime() -> Result<Runtime, StepError> {
    Runtime::new().map_err(|err| StepError::Assertion(err.to_string()))
}

fn recorded(storage_type: &str) -> StorageDescriptor {
    StorageDescriptor::new(storage_type.trim()).label("web")
}

#[given("a storage service for contract \"{contract}\"")]
fn storage_service(reconcile_world: &ReconcileWorld, contract: String) {
    reconcile_world.start_service(contract.trim());
}

#[given("attached storage of type \"{storage_type}\" on server \"{server}\"")]
fn attached_storage(reconcile_world: &ReconcileWorld, storage_type: String, server: String) {
    let service = reconcile_world.service();
    let id = service.fake.seed(&recorded(&storage_type));
    service.fake.attach(&id, &ServerId::from(server.trim()));
    reconcile_world.set_resource(id);
}

#[given("detached storage of type \"{storage_type}\"")]
fn detached_storage(reconcile_world: &ReconcileWorld, storage_type: String) {
    let service = reconcile_world.service();
    let id = service.fake.seed(&recorded(&storage_type));
    reconcile_world.set_resource(id);
}

fn create(reconcile_world: &ReconcileWorld, desired: &StorageDescriptor) -> Result<(), StepError> {
    let service = reconcile_world.service();
    let result = runtime()?.block_on(service.reconciler.create(&service.ctx, desired));
    reconcile_world.set_outcome(match result {
        Ok(created) => PassOutcome::Created(created.resource_id),
        Err(err) => PassOutcome::CreateFailed(err),
    });
    Ok(())
}

#[when("I create storage of type \"{storage_type}\"")]
fn create_plain(reconcile_world: &ReconcileWorld, storage_type: String) -> Result<(), StepError> {
    create(reconcile_world, &StorageDescriptor::new(storage_type.trim()))
}

#[when("I create storage from an image owned by contract \"{owner}\"")]
fn create_restored(reconcile_world: &ReconcileWorld, owner: String) -> Result<(), StepError> {
    let desired = StorageDescriptor::new("S100").source_image(SourceImage {
        owner_contract_id: ContractId::from(owner.trim()),
        archive_id: ArchiveId::from("iar00000001"),
        image_id: ImageId::from("img00000001"),
    });
    create(reconcile_world, &desired)
}

fn update(reconcile_world: &ReconcileWorld, desired: &StorageDescriptor) -> Result<(), StepError> {
    let service = reconcile_world.service();
    let id = reconcile_world.resource();
    let previous = recorded(&desired.storage_type);
    let result = runtime()?.block_on(service.reconciler.update(
        &service.ctx,
        &id,
        &previous,
        desired,
    ));
    reconcile_world.set_outcome(match result {
        Ok(report) => PassOutcome::Updated(report),
        Err(err) => PassOutcome::UpdateFailed(err),
    });
    Ok(())
}

#[when("I change the root SSH key and password")]
fn change_credentials(reconcile_world: &ReconcileWorld) -> Result<(), StepError> {
    let desired = recorded("S100")
        .root_ssh_key("ssh-ed25519 AAAA")
        .root_password("hunter2");
    update(reconcile_world, &desired)
}

#[when("I change the label to \"{label}\"")]
fn change_label(reconcile_world: &ReconcileWorld, label: String) -> Result<(), StepError> {
    update(reconcile_world, &recorded("S100").label(label.trim()))
}

#[when("I delete the storage")]
fn delete_storage(reconcile_world: &ReconcileWorld) -> Result<(), StepError> {
    let service = reconcile_world.service();
    let id = reconcile_world.resource();
    let result = runtime()?.block_on(service.reconciler.delete(&service.ctx, &id));
    reconcile_world.set_outcome(match result {
        Ok(()) => PassOutcome::Deleted,
        Err(err) => PassOutcome::DeleteFailed(err),
    });
    Ok(())
}

#[then("the create succeeds")]
fn create_succeeds(reconcile_world: &ReconcileWorld) -> Result<(), StepError> {
    match reconcile_world.outcome() {
        Some(PassOutcome::Created(id)) if reconcile_world.service().fake.info(&id).is_some() => {
            Ok(())
        }
        other => Err(StepError::Assertion(format!(
            "expected created storage, got {other:?}"
        ))),
    }
}

#[then("the create is rejected before any remote call")]
fn create_rejected(reconcile_world: &ReconcileWorld) -> Result<(), StepError> {
    let Some(PassOutcome::CreateFailed(err)) = reconcile_world.outcome() else {
        return Err(StepError::Assertion(String::from(
            "expected a failed create",
        )));
    };
    if err.resource_id().is_some() {
        return Err(StepError::Assertion(format!(
            "expected nothing provisioned, got {err}"
        )));
    }
    let events = reconcile_world.service().fake.events();
    if events.is_empty() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected no remote interaction, got {events:?}"
        )))
    }
}

#[then("the update succeeds")]
fn update_succeeds(reconcile_world: &ReconcileWorld) -> Result<(), StepError> {
    match reconcile_world.outcome() {
        Some(PassOutcome::Updated(report)) if !report.is_noop() => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a successful update, got {other:?}"
        ))),
    }
}

#[then("the delete succeeds")]
fn delete_succeeds(reconcile_world: &ReconcileWorld) -> Result<(), StepError> {
    match reconcile_world.outcome() {
        Some(PassOutcome::Deleted) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected a successful delete, got {other:?}"
        ))),
    }
}

#[then("the delete is refused")]
fn delete_refused(reconcile_world: &ReconcileWorld) -> Result<(), StepError> {
    match reconcile_world.outcome() {
        Some(PassOutcome::DeleteFailed(ReconcileError::NotDeletable { .. })) => Ok(()),
        other => Err(StepError::Assertion(format!(
            "expected the delete to be refused, got {other:?}"
        ))),
    }
}

#[then("the service received {count:u32} calls to \"{operation}\"")]
fn received_calls(
    reconcile_world: &ReconcileWorld,
    count: u32,
    operation: String,
) -> Result<(), StepError> {
    let actual = reconcile_world.service().fake.count(operation.trim());
    if actual == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} {operation} calls, got {actual}"
        )))
    }
}

#[then("the service recorded {count:u32} convergence waits")]
fn recorded_waits(reconcile_world: &ReconcileWorld, count: u32) -> Result<(), StepError> {
    let waits = reconcile_world.service().fake.waits();
    if waits.len() == count as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {count} waits, got {waits:?}"
        )))
    }
}

#[then("the server was powered off {off:u32} times and on {on:u32} times")]
fn power_cycles(reconcile_world: &ReconcileWorld, off: u32, on: u32) -> Result<(), StepError> {
    let transitions = reconcile_world.service().fake.power_transitions();
    let count = |state: PowerState| {
        transitions
            .iter()
            .filter(|(_, power)| *power == state)
            .count()
    };
    if count(PowerState::Off) == off as usize && count(PowerState::On) == on as usize {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected {off} off and {on} on transitions, got {transitions:?}"
        )))
    }
}

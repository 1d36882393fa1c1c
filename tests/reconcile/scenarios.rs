//! BDD scenarios for reconciliation passes.

use rstest_bdd_macros::scenario;

use super::test_helpers::{ReconcileWorld, reconcile_world};

#[scenario(
    path = "tests/features/reconcile.feature",
    name = "Create plain storage and wait for it to settle"
)]
fn scenario_create_plain_storage(reconcile_world: ReconcileWorld) {
    let _ = reconcile_world;
}

#[scenario(
    path = "tests/features/reconcile.feature",
    name = "Reject a restore from another contract"
)]
fn scenario_reject_cross_contract_restore(reconcile_world: ReconcileWorld) {
    let _ = reconcile_world;
}

#[scenario(
    path = "tests/features/reconcile.feature",
    name = "Power cycle once for credential changes on attached storage"
)]
fn scenario_power_cycle_once(reconcile_world: ReconcileWorld) {
    let _ = reconcile_world;
}

#[scenario(
    path = "tests/features/reconcile.feature",
    name = "Leave power alone for label changes"
)]
fn scenario_label_change_without_power(reconcile_world: ReconcileWorld) {
    let _ = reconcile_world;
}

#[scenario(
    path = "tests/features/reconcile.feature",
    name = "Refuse to cancel attached storage"
)]
fn scenario_refuse_attached_delete(reconcile_world: ReconcileWorld) {
    let _ = reconcile_world;
}

#[scenario(
    path = "tests/features/reconcile.feature",
    name = "Cancel detached storage"
)]
fn scenario_cancel_detached_storage(reconcile_world: ReconcileWorld) {
    let _ = reconcile_world;
}

//! Update pass.

use tracing::{info, warn};

use super::guard::PowerBracket;
use super::{ReconcileContext, ReconcileError, StorageReconciler};
use crate::api::StorageApi;
use crate::api::wait::ConvergenceWaiter;
use crate::storage::{FieldChanges, MutableField, ResourceId, StorageDescriptor};

/// Outcome of an update pass.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct UpdateReport {
    /// Fields sent to the provider, in application order.
    pub applied: Vec<MutableField>,
    /// Write-only fields that changed to empty; recorded locally only.
    pub cleared: Vec<MutableField>,
    /// Whether the attached server was powered off and back on.
    pub power_cycled: bool,
}

impl UpdateReport {
    /// Report for a pass that had nothing to do.
    #[must_use]
    pub fn unchanged() -> Self {
        Self::default()
    }

    /// Returns `true` when no field changed.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.applied.is_empty() && self.cleared.is_empty()
    }
}

impl<A, W> StorageReconciler<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    /// Applies the mutable fields that differ between `previous` and
    /// `desired`.
    ///
    /// Label changes go straight through. Secret changes on attached storage
    /// are bracketed by a single power-off before the first of them and a
    /// single power-on after the last. Creation-only attributes are never
    /// touched; drift in them is logged.
    ///
    /// # Errors
    ///
    /// Any failed step aborts the pass without rollback. If the server was
    /// already powered off it stays off.
    pub async fn update(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
        previous: &StorageDescriptor,
        desired: &StorageDescriptor,
    ) -> Result<UpdateReport, ReconcileError> {
        for field in desired.immutable_drift(previous) {
            warn!(
                resource_id = %resource_id,
                field,
                "creation-only attribute differs from recorded state; not changed"
            );
        }

        let changes = desired.changes_from(previous);
        if changes.is_empty() {
            return Ok(UpdateReport::unchanged());
        }

        let info = self.storage_info(ctx, resource_id).await?;
        let mut bracket = PowerBracket::for_storage(&info)?;
        let mut report = UpdateReport::unchanged();

        match self
            .apply_changes(ctx, resource_id, desired, &changes, &mut bracket, &mut report)
            .await
        {
            Ok(()) => {
                report.power_cycled = bracket.release(&self.api, ctx).await?;
                info!(
                    resource_id = %resource_id,
                    applied = report.applied.len(),
                    cleared = report.cleared.len(),
                    power_cycled = report.power_cycled,
                    "storage updated"
                );
                Ok(report)
            }
            Err(err) => {
                if let Some(server) = bracket.server().filter(|_| bracket.powered_off()) {
                    warn!(
                        resource_id = %resource_id,
                        server_id = %server,
                        "update aborted while the server was powered off; it stays off"
                    );
                }
                Err(err)
            }
        }
    }

    async fn apply_changes(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
        desired: &StorageDescriptor,
        changes: &FieldChanges,
        bracket: &mut PowerBracket,
        report: &mut UpdateReport,
    ) -> Result<(), ReconcileError> {
        for field in changes.iter() {
            let value = field.value(desired);
            if field.needs_power_off() {
                if value.is_empty() {
                    report.cleared.push(field);
                    continue;
                }
                bracket.ensure_powered_off(&self.api, ctx).await?;
            }
            self.apply_field(ctx, resource_id, field, value).await?;
            report.applied.push(field);
        }
        Ok(())
    }
}

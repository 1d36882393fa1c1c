//! Delete pass.

use tracing::info;

use super::steps::accept;
use super::{ReconcileContext, ReconcileError, StorageReconciler};
use crate::api::wait::ConvergenceWaiter;
use crate::api::{Operation, StorageApi};
use crate::storage::{Convergence, ResourceId};

impl<A, W> StorageReconciler<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    /// Cancels storage once it is in service and detached.
    ///
    /// The wait enforces the precondition rather than trusting the caller to
    /// have detached the volume. When it fails nothing is cancelled and the
    /// storage stays recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::NotDeletable`] when the precondition is not
    /// observed and [`ReconcileError::Remote`] when cancellation fails.
    pub async fn delete(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
    ) -> Result<(), ReconcileError> {
        self.waiter
            .wait_for(
                &ctx.contract_id,
                resource_id,
                &Convergence::detached(),
                ctx.wait_timeout,
            )
            .await
            .map_err(|reason| ReconcileError::NotDeletable {
                resource_id: resource_id.clone(),
                reason: Box::new(reason),
            })?;

        accept(
            &self.api,
            ctx,
            Operation::CancelStorage {
                resource_id: resource_id.clone(),
            },
        )
        .await?;
        info!(resource_id = %resource_id, "storage cancelled");
        Ok(())
    }
}

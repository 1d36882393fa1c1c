//! Read pass.

use super::{ReconcileContext, ReconcileError, StorageReconciler};
use crate::api::StorageApi;
use crate::api::wait::ConvergenceWaiter;
use crate::storage::{ResourceId, StorageDescriptor};

impl<A, W> StorageReconciler<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    /// Fetches the provider snapshot and projects it into a descriptor.
    ///
    /// Secrets are never populated, and `encryption` only for extended types.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Remote`] when the snapshot cannot be fetched.
    pub async fn read(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
    ) -> Result<StorageDescriptor, ReconcileError> {
        let info = self.storage_info(ctx, resource_id).await?;
        Ok(StorageDescriptor::observed(&info))
    }
}

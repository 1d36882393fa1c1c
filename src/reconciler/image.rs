//! Image restore and cross-contract copy.

use tracing::info;

use super::steps::call;
use super::{ReconcileContext, ReconcileError, StorageReconciler};
use crate::api::wait::ConvergenceWaiter;
use crate::api::{ApiError, Operation, Reply, StorageApi};
use crate::storage::{ArchiveId, ResourceId, SourceImage};

/// Restores only work within the reconciling contract.
pub(super) fn check_image_owner(
    ctx: &ReconcileContext,
    image: &SourceImage,
) -> Result<(), ReconcileError> {
    if image.owner_contract_id == ctx.contract_id {
        return Ok(());
    }
    Err(ReconcileError::CrossContractRestore {
        owner: image.owner_contract_id.clone(),
        contract: ctx.contract_id.clone(),
    })
}

impl<A, W> StorageReconciler<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    /// Restores `image` onto existing storage.
    ///
    /// The wait expects the attachment observed before the restore.
    pub(super) async fn restore(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
        image: &SourceImage,
    ) -> Result<(), ReconcileError> {
        check_image_owner(ctx, image)?;
        self.set_then_wait(ctx, resource_id, Operation::restore(resource_id.clone(), image))
            .await?;
        info!(
            resource_id = %resource_id,
            archive_id = %image.archive_id,
            image_id = %image.image_id,
            "image restored"
        );
        Ok(())
    }

    /// Copies an image owned by another contract into `destination_archive`
    /// under the reconciling contract, returning a source usable for restore.
    ///
    /// # Errors
    ///
    /// Returns [`ReconcileError::Remote`] when the copy call fails.
    pub async fn copy_image(
        &self,
        ctx: &ReconcileContext,
        source: &SourceImage,
        destination_archive: &ArchiveId,
    ) -> Result<SourceImage, ReconcileError> {
        let operation = Operation::copy_image(
            source,
            ctx.contract_id.clone(),
            destination_archive.clone(),
        );
        let name = operation.name();
        match call(&self.api, ctx, operation).await? {
            Reply::ImageCopied {
                archive_id,
                image_id,
            } => {
                info!(
                    source_contract = %source.owner_contract_id,
                    image_id = %image_id,
                    archive_id = %archive_id,
                    "image copied"
                );
                Ok(SourceImage {
                    owner_contract_id: ctx.contract_id.clone(),
                    archive_id,
                    image_id,
                })
            }
            other => Err(ReconcileError::remote(
                name,
                ApiError::UnexpectedReply {
                    operation: name,
                    reply: other.kind(),
                },
            )),
        }
    }
}

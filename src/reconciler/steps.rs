//! Remote call and set-then-wait helpers shared by every pass.

use tracing::debug;

use super::{ReconcileContext, ReconcileError, StorageReconciler};
use crate::api::wait::ConvergenceWaiter;
use crate::api::{ApiError, Operation, Reply, Request, StorageApi, fetch_storage_info};
use crate::storage::{Convergence, MutableField, ResourceId, StorageInfo};

/// Issues `operation` under the context's contract.
pub(super) async fn call<A>(
    api: &A,
    ctx: &ReconcileContext,
    operation: Operation,
) -> Result<Reply, ReconcileError>
where
    A: StorageApi + ?Sized,
{
    let name = operation.name();
    debug!(operation = name, resource_id = ?operation.resource_id(), "calling storage api");
    api.call(Request::new(ctx.contract_id.clone(), operation))
        .await
        .map_err(|source| ReconcileError::remote(name, source))
}

/// Issues a mutation whose only valid reply is [`Reply::Accepted`].
pub(super) async fn accept<A>(
    api: &A,
    ctx: &ReconcileContext,
    operation: Operation,
) -> Result<(), ReconcileError>
where
    A: StorageApi + ?Sized,
{
    let name = operation.name();
    match call(api, ctx, operation).await? {
        Reply::Accepted => Ok(()),
        other => Err(ReconcileError::remote(
            name,
            ApiError::UnexpectedReply {
                operation: name,
                reply: other.kind(),
            },
        )),
    }
}

/// Maps a write-only field onto the operation that applies it.
fn secret_operation(
    field: MutableField,
    resource_id: ResourceId,
    value: String,
) -> Option<Operation> {
    match field {
        MutableField::Label => None,
        MutableField::RootSshKey => Some(Operation::AddPublicKey {
            resource_id,
            public_key: value,
        }),
        MutableField::RootPassword => Some(Operation::SetPassword {
            resource_id,
            password: value,
        }),
        MutableField::UserData => Some(Operation::SetUserData {
            resource_id,
            user_data: value,
        }),
    }
}

impl<A, W> StorageReconciler<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    pub(super) async fn storage_info(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
    ) -> Result<StorageInfo, ReconcileError> {
        fetch_storage_info(&self.api, &ctx.contract_id, resource_id)
            .await
            .map_err(|source| ReconcileError::remote("get-storage-info", source))
    }

    pub(super) async fn converge(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
        target: &Convergence,
    ) -> Result<(), ReconcileError> {
        self.waiter
            .wait_for(&ctx.contract_id, resource_id, target, ctx.wait_timeout)
            .await?;
        debug!(resource_id = %resource_id, target = %target, "storage converged");
        Ok(())
    }

    /// Mutations that must not change attachment: record the attachment,
    /// apply, then wait for `InService` with that same attachment.
    pub(super) async fn set_then_wait(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
        operation: Operation,
    ) -> Result<(), ReconcileError> {
        let before = self.storage_info(ctx, resource_id).await?;
        accept(&self.api, ctx, operation).await?;
        self.converge(ctx, resource_id, &Convergence::in_service(before.attachment))
            .await
    }

    pub(super) async fn apply_field(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
        field: MutableField,
        value: &str,
    ) -> Result<(), ReconcileError> {
        match secret_operation(field, resource_id.clone(), value.to_owned()) {
            Some(operation) => self.set_then_wait(ctx, resource_id, operation).await?,
            None => {
                accept(
                    &self.api,
                    ctx,
                    Operation::SetLabel {
                        resource_id: resource_id.clone(),
                        label: value.to_owned(),
                    },
                )
                .await?;
            }
        }
        debug!(resource_id = %resource_id, field = %field, "field applied");
        Ok(())
    }
}

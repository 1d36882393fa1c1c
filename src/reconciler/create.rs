//! Create pass.

use tracing::info;

use super::steps::call;
use super::{CreateError, ReconcileContext, ReconcileError, StorageReconciler};
use crate::api::wait::ConvergenceWaiter;
use crate::api::{ApiError, Operation, Reply, StorageApi};
use crate::storage::{Convergence, MutableField, ResourceId, StorageDescriptor};

/// Result of a successful create pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Created {
    /// Identity assigned by the provider.
    pub resource_id: ResourceId,
    /// State read back after every step converged.
    pub observed: StorageDescriptor,
}

impl<A, W> StorageReconciler<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    /// Provisions storage for `desired` and applies its optional fields.
    ///
    /// Order: create, wait for `(InService, NotAttached)`, restore the source
    /// image, then label, SSH key, password, and user data, then read back.
    /// Validation happens before the first remote call.
    ///
    /// # Errors
    ///
    /// Returns [`CreateError::NotCreated`] when validation or the create call
    /// fails, and [`CreateError::Incomplete`] (carrying the new identity) when
    /// any later step fails.
    pub async fn create(
        &self,
        ctx: &ReconcileContext,
        desired: &StorageDescriptor,
    ) -> Result<Created, CreateError> {
        validate_for_create(ctx, desired).map_err(CreateError::NotCreated)?;
        let resource_id = self
            .issue_create(ctx, desired)
            .await
            .map_err(CreateError::NotCreated)?;
        info!(
            resource_id = %resource_id,
            storage_type = %desired.storage_type,
            "storage created"
        );

        match self.provision(ctx, &resource_id, desired).await {
            Ok(observed) => Ok(Created {
                resource_id,
                observed,
            }),
            Err(source) => Err(CreateError::Incomplete {
                resource_id,
                source: Box::new(source),
            }),
        }
    }

    async fn issue_create(
        &self,
        ctx: &ReconcileContext,
        desired: &StorageDescriptor,
    ) -> Result<ResourceId, ReconcileError> {
        let operation = Operation::CreateStorage {
            storage_type: desired.storage_type.trim().to_owned(),
            storage_group: desired
                .storage_group
                .as_ref()
                .filter(|group| !group.is_empty())
                .cloned(),
            encryption: desired.encryption_for_create(),
        };
        let name = operation.name();
        match call(&self.api, ctx, operation).await? {
            Reply::Created { resource_id } => Ok(resource_id),
            other => Err(ReconcileError::remote(
                name,
                ApiError::UnexpectedReply {
                    operation: name,
                    reply: other.kind(),
                },
            )),
        }
    }

    async fn provision(
        &self,
        ctx: &ReconcileContext,
        resource_id: &ResourceId,
        desired: &StorageDescriptor,
    ) -> Result<StorageDescriptor, ReconcileError> {
        self.converge(ctx, resource_id, &Convergence::detached())
            .await?;

        if let Some(image) = &desired.source_image {
            self.restore(ctx, resource_id, image).await?;
        }

        for field in MutableField::ALL {
            let value = field.value(desired);
            if value.is_empty() {
                continue;
            }
            self.apply_field(ctx, resource_id, field, value).await?;
        }

        self.read(ctx, resource_id).await
    }
}

fn validate_for_create(
    ctx: &ReconcileContext,
    desired: &StorageDescriptor,
) -> Result<(), ReconcileError> {
    if desired.storage_type.trim().is_empty() {
        return Err(ReconcileError::Validation {
            field: "type",
            message: String::from("must not be empty"),
        });
    }
    if let Some(image) = &desired.source_image {
        super::image::check_image_owner(ctx, image)?;
    }
    Ok(())
}

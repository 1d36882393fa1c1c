//! Error types for reconciliation passes.

use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;
use crate::api::wait::WaitError;
use crate::storage::{ContractId, Convergence, ResourceId};

/// Errors that abort a reconciliation pass.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReconcileError {
    /// Raised before any remote call when the descriptor is unusable.
    #[error("invalid storage descriptor: {field} {message}")]
    Validation {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
    /// Raised before any remote call when the source image lives in another
    /// contract.
    #[error(
        "source image belongs to contract {owner}, not {contract}; copy it into this contract before restoring"
    )]
    CrossContractRestore {
        /// Contract owning the image.
        owner: ContractId,
        /// Contract performing the restore.
        contract: ContractId,
    },
    /// A remote call failed; surfaced verbatim and never retried here.
    #[error("{operation} failed: {source}")]
    Remote {
        /// Operation that failed.
        operation: &'static str,
        /// Provider or transport failure.
        #[source]
        source: ApiError,
    },
    /// A wait passed its deadline. The mutation may still land; re-read
    /// before deciding what to do next.
    #[error("storage {resource_id} did not reach {target} within {timeout:?}")]
    ConvergenceTimeout {
        /// Storage being waited on.
        resource_id: ResourceId,
        /// Target pair.
        target: Convergence,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// Delete could not observe a cancellable state.
    #[error("storage {resource_id} cannot be cancelled: {reason}")]
    NotDeletable {
        /// Storage that stays recorded.
        resource_id: ResourceId,
        /// Why the precondition was not observed.
        #[source]
        reason: Box<WaitError>,
    },
    /// The provider reported an attachment without naming the server.
    #[error("storage {resource_id} reports Attached without an attached server")]
    MissingAttachedServer {
        /// Storage with the inconsistent snapshot.
        resource_id: ResourceId,
    },
}

impl ReconcileError {
    pub(super) const fn remote(operation: &'static str, source: ApiError) -> Self {
        Self::Remote { operation, source }
    }
}

impl From<WaitError> for ReconcileError {
    fn from(value: WaitError) -> Self {
        match value {
            WaitError::Timeout {
                resource_id,
                target,
                timeout,
            } => Self::ConvergenceTimeout {
                resource_id,
                target,
                timeout,
            },
            WaitError::Api { source, .. } => Self::Remote {
                operation: "get-storage-info",
                source,
            },
        }
    }
}

/// Errors returned by a create pass.
///
/// Once the provider has assigned an identity every failure carries it, so
/// the caller can record the resource and resume with read/update instead of
/// provisioning a duplicate.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CreateError {
    /// Nothing was provisioned.
    #[error("storage was not created: {0}")]
    NotCreated(#[source] ReconcileError),
    /// The storage exists but a later step failed.
    #[error("storage {resource_id} was created but provisioning stopped: {source}")]
    Incomplete {
        /// Identity assigned by the provider.
        resource_id: ResourceId,
        /// Step that failed.
        #[source]
        source: Box<ReconcileError>,
    },
}

impl CreateError {
    /// Identity of the storage left behind, if one was provisioned.
    #[must_use]
    pub const fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Self::NotCreated(_) => None,
            Self::Incomplete { resource_id, .. } => Some(resource_id),
        }
    }

    /// Underlying failure.
    #[must_use]
    pub fn cause(&self) -> &ReconcileError {
        match self {
            Self::NotCreated(source) => source,
            Self::Incomplete { source, .. } => source,
        }
    }
}

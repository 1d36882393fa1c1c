//! Reconciliation passes for system storage.
//!
//! A [`StorageReconciler`] drives one pass at a time (create, read, update,
//! delete) against a [`StorageApi`] and a [`ConvergenceWaiter`]. Steps within
//! a pass are strictly sequential because each remote effect may be the
//! precondition of the next. The caller must not run two passes for the same
//! identity concurrently.

mod create;
mod delete;
mod error;
mod guard;
mod image;
mod read;
mod steps;
mod update;

use std::time::Duration;

use crate::api::StorageApi;
use crate::api::wait::ConvergenceWaiter;
use crate::storage::{ContractId, ResourceId};

pub use create::Created;
pub use error::{CreateError, ReconcileError};
pub use update::UpdateReport;

/// Deadline shared by every convergence wait in a pass.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Request-scoped settings threaded through every pass.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReconcileContext {
    /// Contract the caller acts under.
    pub contract_id: ContractId,
    /// Deadline for each convergence wait.
    pub wait_timeout: Duration,
}

impl ReconcileContext {
    /// Creates a context with the default wait timeout.
    #[must_use]
    pub const fn new(contract_id: ContractId) -> Self {
        Self {
            contract_id,
            wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }

    /// Overrides the wait timeout.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }
}

/// Drives storage reconciliation passes.
#[derive(Clone, Debug)]
pub struct StorageReconciler<A, W> {
    api: A,
    waiter: W,
}

impl<A, W> StorageReconciler<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    /// Creates a reconciler over the given remote collaborators.
    #[must_use]
    pub const fn new(api: A, waiter: W) -> Self {
        Self { api, waiter }
    }

    /// Adopts an externally supplied identifier verbatim.
    #[must_use]
    pub fn import(raw: impl Into<String>) -> ResourceId {
        ResourceId::new(raw)
    }
}

#[cfg(test)]
mod tests;

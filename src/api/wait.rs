//! Convergence waits for eventually consistent storage state.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::time::sleep;
use tracing::debug;

use super::{ApiError, ApiFuture, StorageApi, fetch_storage_info};
use crate::storage::{ContractId, Convergence, ResourceId};

/// Errors raised while waiting for convergence.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum WaitError {
    /// The deadline passed before the target pair was observed.
    #[error("timed out after {timeout:?} waiting for storage {resource_id} to reach {target}")]
    Timeout {
        /// Storage being waited on.
        resource_id: ResourceId,
        /// Target pair.
        target: Convergence,
        /// Deadline that elapsed.
        timeout: Duration,
    },
    /// Polling itself failed.
    #[error("polling storage {resource_id} failed: {source}")]
    Api {
        /// Storage being waited on.
        resource_id: ResourceId,
        /// Underlying remote failure.
        #[source]
        source: ApiError,
    },
}

/// Blocks until a storage resource reports a target `(status, attachment)`.
pub trait ConvergenceWaiter: Send + Sync {
    /// Waits until `resource_id` reaches `target` or `timeout` elapses.
    fn wait_for<'a>(
        &'a self,
        contract_id: &'a ContractId,
        resource_id: &'a ResourceId,
        target: &'a Convergence,
        timeout: Duration,
    ) -> ApiFuture<'a, (), WaitError>;
}

/// Waiter that polls `get-storage-info` at a fixed interval.
#[derive(Clone, Debug)]
pub struct PollingWaiter<A> {
    api: A,
    poll_interval: Duration,
}

impl<A> PollingWaiter<A>
where
    A: StorageApi,
{
    /// Creates a waiter polling through `api` every `poll_interval`.
    #[must_use]
    pub const fn new(api: A, poll_interval: Duration) -> Self {
        Self { api, poll_interval }
    }

    async fn poll_until(
        &self,
        contract_id: &ContractId,
        resource_id: &ResourceId,
        target: &Convergence,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        // A timeout too large to represent never expires.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let info = fetch_storage_info(&self.api, contract_id, resource_id)
                .await
                .map_err(|source| WaitError::Api {
                    resource_id: resource_id.clone(),
                    source,
                })?;

            if target.is_reached_by(&info) {
                return Ok(());
            }
            debug!(
                resource_id = %resource_id,
                status = %info.status,
                attachment = %info.attachment,
                target = %target,
                "storage has not converged yet"
            );

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(WaitError::Timeout {
                            resource_id: resource_id.clone(),
                            target: target.clone(),
                            timeout,
                        });
                    }
                    self.poll_interval.min(deadline - now)
                }
                None => self.poll_interval,
            };
            sleep(pause).await;
        }
    }
}

impl<A> ConvergenceWaiter for PollingWaiter<A>
where
    A: StorageApi,
{
    fn wait_for<'a>(
        &'a self,
        contract_id: &'a ContractId,
        resource_id: &'a ResourceId,
        target: &'a Convergence,
        timeout: Duration,
    ) -> ApiFuture<'a, (), WaitError> {
        Box::pin(self.poll_until(contract_id, resource_id, target, timeout))
    }
}

//! Reconciler for provider-managed system storage volumes.
//!
//! Callers declare a [`StorageDescriptor`] and the [`StorageReconciler`]
//! drives an eventually consistent storage service towards it: every
//! state-changing call is followed by a convergence wait, and credential
//! changes on attached storage are bracketed by a single server power cycle.
//! The [`StateStore`] keeps the last known descriptor per resource so later
//! passes can diff against it.

pub mod api;
pub mod config;
pub mod reconciler;
pub mod state_store;
pub mod storage;
pub mod test_support;

pub use api::http::HttpStorageApi;
pub use api::wait::{ConvergenceWaiter, PollingWaiter, WaitError};
pub use api::{ApiError, StorageApi};
pub use config::{ConfigError, StowageConfig};
pub use reconciler::{
    CreateError, Created, ReconcileContext, ReconcileError, StorageReconciler, UpdateReport,
};
pub use state_store::{StateRecord, StateStore, StateStoreError};
pub use storage::{ResourceId, SourceImage, StorageDescriptor, StorageInfo};

//! Remote storage service abstraction.
//!
//! Every provider call goes through [`StorageApi::call`], keyed by the closed
//! [`Operation`] set. Convergence polling lives in [`wait`] and the default
//! HTTP transport in [`http`].

pub mod http;
mod operation;
pub mod wait;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use crate::storage::{ContractId, ResourceId, StorageInfo};

pub use operation::{ImageSource, Operation, PowerState, Reply, Request};

/// Future returned by remote capabilities.
pub type ApiFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Errors raised by a remote call.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ApiError {
    /// The request never produced a provider response.
    #[error("transport failure: {message}")]
    Transport {
        /// Underlying client message.
        message: String,
    },
    /// The provider answered with an error.
    #[error("provider rejected request with status {status}: {message}")]
    Provider {
        /// HTTP status code.
        status: u16,
        /// Body returned by the provider.
        message: String,
    },
    /// The provider answered with a body that could not be decoded.
    #[error("failed to decode {operation} response: {message}")]
    Decode {
        /// Operation whose response failed to decode.
        operation: &'static str,
        /// Decoder message.
        message: String,
    },
    /// The reply shape does not belong to the operation issued.
    #[error("{operation} returned an unexpected {reply} reply")]
    UnexpectedReply {
        /// Operation issued.
        operation: &'static str,
        /// Reply kind received.
        reply: &'static str,
    },
}

/// Issues single named operations against the storage service.
pub trait StorageApi: Send + Sync {
    /// Sends one request and returns the provider's typed reply.
    fn call(&self, request: Request) -> ApiFuture<'_, Reply, ApiError>;
}

impl<A> StorageApi for Arc<A>
where
    A: StorageApi + ?Sized,
{
    fn call(&self, request: Request) -> ApiFuture<'_, Reply, ApiError> {
        (**self).call(request)
    }
}

impl<A> StorageApi for &A
where
    A: StorageApi + ?Sized,
{
    fn call(&self, request: Request) -> ApiFuture<'_, Reply, ApiError> {
        (**self).call(request)
    }
}

/// Fetches the current snapshot of `resource_id`.
///
/// # Errors
///
/// Returns [`ApiError`] when the call fails or the provider answers with
/// anything other than a snapshot.
pub async fn fetch_storage_info<A>(
    api: &A,
    contract_id: &ContractId,
    resource_id: &ResourceId,
) -> Result<StorageInfo, ApiError>
where
    A: StorageApi + ?Sized,
{
    let operation = Operation::GetStorageInfo {
        resource_id: resource_id.clone(),
    };
    let name = operation.name();
    match api.call(Request::new(contract_id.clone(), operation)).await? {
        Reply::Info(info) => Ok(info),
        other => Err(ApiError::UnexpectedReply {
            operation: name,
            reply: other.kind(),
        }),
    }
}

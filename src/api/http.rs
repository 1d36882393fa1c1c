//! HTTP transport for the storage service.

use std::sync::LazyLock;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::{ApiError, ApiFuture, Operation, Reply, Request, StorageApi};
use crate::config::StowageConfig;
use crate::storage::{ArchiveId, ContractId, ImageId, ResourceId, StorageInfo};

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

static HTTP_CLIENT: LazyLock<reqwest::Client> = LazyLock::new(|| {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
});

#[derive(Deserialize)]
struct CreatedBody {
    resource_id: ResourceId,
}

#[derive(Deserialize)]
struct CopiedBody {
    archive_id: ArchiveId,
    image_id: ImageId,
}

/// [`StorageApi`] backed by the provider's JSON endpoint.
#[derive(Clone, Debug)]
pub struct HttpStorageApi {
    endpoint: String,
    access_key: Option<String>,
    secret_key: String,
}

impl HttpStorageApi {
    /// Creates a transport posting to `endpoint` with a bearer secret.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            access_key: None,
            secret_key: secret_key.into(),
        }
    }

    /// Sends `X-Access-Key` with every request.
    #[must_use]
    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// Builds a transport from validated configuration.
    #[must_use]
    pub fn from_config(config: &StowageConfig) -> Self {
        let api = Self::new(config.endpoint.clone(), config.secret_key.clone());
        match config.access_key.as_deref().filter(|key| !key.is_empty()) {
            Some(key) => api.with_access_key(key),
            None => api,
        }
    }

    /// URL requests for `contract_id` are posted to.
    #[must_use]
    pub fn storage_url(&self, contract_id: &ContractId) -> String {
        format!(
            "{}/v1/contracts/{}/storage",
            self.endpoint.trim_end_matches('/'),
            contract_id
        )
    }

    async fn send(&self, request: Request) -> Result<Reply, ApiError> {
        let name = request.operation.name();
        let url = self.storage_url(&request.contract_id);
        debug!(operation = name, url = %url, "posting storage request");

        let mut builder = HTTP_CLIENT
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&request);
        if let Some(access_key) = &self.access_key {
            builder = builder.header("X-Access-Key", access_key);
        }

        let response = builder.send().await.map_err(|err| ApiError::Transport {
            message: err.to_string(),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|err| ApiError::Transport {
            message: err.to_string(),
        })?;
        if !status.is_success() {
            return Err(ApiError::Provider {
                status: status.as_u16(),
                message: body,
            });
        }

        decode_reply(&request.operation, &body)
    }
}

impl StorageApi for HttpStorageApi {
    fn call(&self, request: Request) -> ApiFuture<'_, Reply, ApiError> {
        Box::pin(self.send(request))
    }
}

/// Interprets a successful response body for `operation`.
fn decode_reply(operation: &Operation, body: &str) -> Result<Reply, ApiError> {
    let name = operation.name();
    match operation {
        Operation::CreateStorage { .. } => {
            let created: CreatedBody = decode(name, body)?;
            Ok(Reply::Created {
                resource_id: created.resource_id,
            })
        }
        Operation::GetStorageInfo { .. } => decode::<StorageInfo>(name, body).map(Reply::Info),
        Operation::CopyImage { .. } => {
            let copied: CopiedBody = decode(name, body)?;
            Ok(Reply::ImageCopied {
                archive_id: copied.archive_id,
                image_id: copied.image_id,
            })
        }
        _ => Ok(Reply::Accepted),
    }
}

fn decode<T: DeserializeOwned>(operation: &'static str, body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body).map_err(|err| ApiError::Decode {
        operation,
        message: err.to_string(),
    })
}

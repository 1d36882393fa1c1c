//! Configuration loading via `ortho-config`.

use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::reconciler::ReconcileContext;
use crate::storage::ContractId;

/// Provider and local settings derived from environment variables,
/// configuration files, and CLI flags.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "STOWAGE")]
pub struct StowageConfig {
    /// Base URL of the storage service.
    pub endpoint: String,
    /// Access key sent alongside the secret when the provider asks for it.
    pub access_key: Option<String>,
    /// Secret used as the bearer credential. This value is required.
    pub secret_key: String,
    /// Contract every call is scoped to.
    pub contract_id: String,
    /// Deadline for each convergence wait, in seconds.
    #[ortho_config(default = 300)]
    pub wait_timeout_secs: u64,
    /// Interval between convergence polls, in seconds.
    #[ortho_config(default = 10)]
    pub poll_interval_secs: u64,
    /// JSON file recording managed storage.
    #[ortho_config(default = "stowage-state.json".to_owned())]
    pub state_file: String,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }
}

impl StowageConfig {
    fn require_field(value: &str, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to stowage.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    fn require_positive(value: u64, metadata: &FieldMetadata) -> Result<(), ConfigError> {
        if value == 0 {
            return Err(ConfigError::MissingField(format!(
                "{} must be greater than zero: set {} or {} in stowage.toml",
                metadata.description, metadata.env_var, metadata.toml_key
            )));
        }
        Ok(())
    }

    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("stowage")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Performs semantic validation on required fields. Error messages include
    /// guidance on how to provide missing values via environment variables or
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required field is empty
    /// or a duration is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Self::require_field(
            &self.endpoint,
            &FieldMetadata::new("storage service endpoint", "STOWAGE_ENDPOINT", "endpoint"),
        )?;
        Self::require_field(
            &self.secret_key,
            &FieldMetadata::new("API secret key", "STOWAGE_SECRET_KEY", "secret_key"),
        )?;
        Self::require_field(
            &self.contract_id,
            &FieldMetadata::new("contract ID", "STOWAGE_CONTRACT_ID", "contract_id"),
        )?;
        Self::require_field(
            &self.state_file,
            &FieldMetadata::new("state file path", "STOWAGE_STATE_FILE", "state_file"),
        )?;
        Self::require_positive(
            self.wait_timeout_secs,
            &FieldMetadata::new(
                "wait timeout",
                "STOWAGE_WAIT_TIMEOUT_SECS",
                "wait_timeout_secs",
            ),
        )?;
        Self::require_positive(
            self.poll_interval_secs,
            &FieldMetadata::new(
                "poll interval",
                "STOWAGE_POLL_INTERVAL_SECS",
                "poll_interval_secs",
            ),
        )?;
        Ok(())
    }

    /// Builds the context threaded through every reconciliation pass.
    #[must_use]
    pub fn context(&self) -> ReconcileContext {
        ReconcileContext::new(ContractId::new(self.contract_id.trim()))
            .with_wait_timeout(Duration::from_secs(self.wait_timeout_secs))
    }

    /// Interval between convergence polls.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Location of the state file.
    #[must_use]
    pub fn state_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(&self.state_file)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}

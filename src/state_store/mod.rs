//! Local record of managed storage.
//!
//! The store maps each resource identity to the last descriptor the
//! reconciler produced for it, so later passes have a `previous` state to
//! diff against. Records are written without secrets; applied secrets leave
//! only a fingerprint.

use std::collections::BTreeMap;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::ResourceId;

mod record;

pub use record::{StateRecord, fingerprint};

/// Errors raised while reading or writing the state file.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum StateStoreError {
    /// Raised when file system operations fail.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path that could not be accessed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the state file holds something other than a state record.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// Path that could not be parsed.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
    /// Raised when the configured path cannot name a file.
    #[error("invalid state file path {path}: {message}")]
    InvalidPath {
        /// Offending path.
        path: Utf8PathBuf,
        /// Human-readable error message.
        message: String,
    },
}

/// On-disk layout of the state file.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateFile {
    /// Recorded state keyed by resource identity.
    #[serde(default)]
    pub resources: BTreeMap<ResourceId, StateRecord>,
}

/// JSON-file backed record of managed storage.
#[derive(Clone, Debug)]
pub struct StateStore {
    path: Utf8PathBuf,
}

impl StateStore {
    /// Creates a store backed by `path`. Nothing is read until first use.
    #[must_use]
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the state file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Reads the whole state file. A missing file is an empty state.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the file cannot be read or parsed.
    pub fn load(&self) -> Result<StateFile, StateStoreError> {
        let file_name = self.file_name()?;
        let dir = match self.open_parent() {
            Ok(dir) => dir,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(err) => return Err(self.parent_error(&err)),
        };
        let contents = match dir.read_to_string(file_name) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(StateFile::default()),
            Err(err) => return Err(self.io_error(&err)),
        };
        if contents.trim().is_empty() {
            return Ok(StateFile::default());
        }
        serde_json::from_str(&contents).map_err(|err| StateStoreError::Parse {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }

    /// Returns the recorded state for `resource_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the file cannot be read or parsed.
    pub fn get(&self, resource_id: &ResourceId) -> Result<Option<StateRecord>, StateStoreError> {
        Ok(self.load()?.resources.remove(resource_id))
    }

    /// Records `record` for `resource_id`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the file cannot be read or written.
    pub fn record(
        &self,
        resource_id: &ResourceId,
        record: &StateRecord,
    ) -> Result<(), StateStoreError> {
        let mut state = self.load()?;
        let stored = StateRecord {
            descriptor: record.descriptor.without_secrets(),
            secret_fingerprints: record.secret_fingerprints.clone(),
        };
        state.resources.insert(resource_id.clone(), stored);
        self.save(&state)
    }

    /// Drops the record for `resource_id`, returning whether one existed.
    ///
    /// # Errors
    ///
    /// Returns [`StateStoreError`] when the file cannot be read or written.
    pub fn forget(&self, resource_id: &ResourceId) -> Result<bool, StateStoreError> {
        let mut state = self.load()?;
        if state.resources.remove(resource_id).is_none() {
            return Ok(false);
        }
        self.save(&state)?;
        Ok(true)
    }

    fn save(&self, state: &StateFile) -> Result<(), StateStoreError> {
        let file_name = self.file_name()?;
        Dir::create_ambient_dir_all(self.parent(), ambient_authority())
            .map_err(|err| self.parent_error(&err))?;
        let dir = self.open_parent().map_err(|err| self.parent_error(&err))?;

        let rendered =
            serde_json::to_string_pretty(state).map_err(|err| StateStoreError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            })?;

        // Readers must never observe a partially written file.
        let staging = format!(".{file_name}.tmp");
        dir.write(&staging, rendered)
            .map_err(|err| self.io_error(&err))?;
        dir.rename(&staging, &dir, file_name)
            .map_err(|err| self.io_error(&err))
    }

    fn parent(&self) -> &Utf8Path {
        match self.path.parent() {
            Some(parent) if !parent.as_str().is_empty() => parent,
            _ => Utf8Path::new("."),
        }
    }

    fn file_name(&self) -> Result<&str, StateStoreError> {
        self.path
            .file_name()
            .ok_or_else(|| StateStoreError::InvalidPath {
                path: self.path.clone(),
                message: String::from("state file path is missing a filename"),
            })
    }

    fn open_parent(&self) -> io::Result<Dir> {
        Dir::open_ambient_dir(self.parent(), ambient_authority())
    }

    fn parent_error(&self, err: &io::Error) -> StateStoreError {
        StateStoreError::Io {
            path: self.parent().to_path_buf(),
            message: err.to_string(),
        }
    }

    fn io_error(&self, err: &io::Error) -> StateStoreError {
        StateStoreError::Io {
            path: self.path.clone(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests;

//! Per-resource state record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::reconciler::UpdateReport;
use crate::storage::{MutableField, StorageDescriptor};

/// SHA-256 of a secret value as lowercase hex.
#[must_use]
pub fn fingerprint(value: &str) -> String {
    Sha256::digest(value.as_bytes())
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// What the state file keeps for one resource.
///
/// Secrets never reach disk. Instead each applied secret leaves a fingerprint
/// so the next update can tell whether the declared value is still the one
/// that was sent.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StateRecord {
    /// Last known descriptor, without secrets.
    #[serde(flatten)]
    pub descriptor: StorageDescriptor,
    /// Fingerprint of the last value applied per write-only field.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_fingerprints: BTreeMap<MutableField, String>,
}

impl StateRecord {
    /// Wraps `descriptor` with no secret history.
    #[must_use]
    pub fn new(descriptor: &StorageDescriptor) -> Self {
        Self {
            descriptor: descriptor.without_secrets(),
            secret_fingerprints: BTreeMap::new(),
        }
    }

    /// Notes the secrets of `desired` named by `fields` as applied.
    ///
    /// Non-secret fields are ignored. A field whose declared value is empty
    /// loses its fingerprint.
    #[must_use]
    pub fn with_applied_secrets(
        mut self,
        desired: &StorageDescriptor,
        fields: impl IntoIterator<Item = MutableField>,
    ) -> Self {
        for field in fields.into_iter().filter(|field| field.is_secret()) {
            let value = field.value(desired);
            if value.is_empty() {
                self.secret_fingerprints.remove(&field);
            } else {
                self.secret_fingerprints.insert(field, fingerprint(value));
            }
        }
        self
    }

    /// Descriptor to diff `desired` against.
    ///
    /// A secret whose fingerprint matches the declared value is treated as
    /// unchanged. A recorded secret that no longer matches, including one now
    /// declared empty, is treated as changed. Secrets with no fingerprint
    /// were never applied.
    #[must_use]
    pub fn previous_for(&self, desired: &StorageDescriptor) -> StorageDescriptor {
        let mut previous = self.descriptor.without_secrets();
        for (field, recorded) in &self.secret_fingerprints {
            let declared = field.value(desired);
            let value = if !declared.is_empty() && fingerprint(declared) == *recorded {
                declared.to_owned()
            } else {
                recorded.clone()
            };
            field.assign(&mut previous, Some(value));
        }
        previous
    }

    /// Record after a successful update: the declared label, creation-only
    /// attributes as previously recorded, and fingerprints for every secret
    /// the pass applied or cleared.
    #[must_use]
    pub fn after_update(&self, desired: &StorageDescriptor, report: &UpdateReport) -> Self {
        let next = Self {
            descriptor: StorageDescriptor {
                label: desired.label.clone(),
                ..self.descriptor.without_secrets()
            },
            secret_fingerprints: self.secret_fingerprints.clone(),
        };
        next.with_applied_secrets(
            desired,
            report.applied.iter().chain(report.cleared.iter()).copied(),
        )
    }

    /// Replaces the descriptor with a fresh observation, keeping what a read
    /// cannot report: the restored image and secret fingerprints.
    #[must_use]
    pub fn refreshed(&self, observed: &StorageDescriptor) -> Self {
        Self {
            descriptor: StorageDescriptor {
                source_image: self.descriptor.source_image.clone(),
                ..observed.without_secrets()
            },
            secret_fingerprints: self.secret_fingerprints.clone(),
        }
    }
}

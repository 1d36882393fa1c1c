//! Desired and observed state of a system storage volume.
//!
//! [`StorageDescriptor`] is what callers declare and what the state store
//! persists. [`StorageInfo`] is the provider snapshot a read returns. The two
//! meet in [`StorageDescriptor::observed`], which projects a snapshot back
//! into a descriptor without ever surfacing write-only secrets.

mod types;
pub mod variant;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use types::{ArchiveId, ContractId, ImageId, ResourceId, ServerId};
pub use variant::is_extended;

/// Encryption value sent for extended storage when none was declared.
pub const DEFAULT_ENCRYPTION: &str = "No";

/// Service status reported by the provider for a storage resource.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceStatus {
    /// Provisioning is still in progress.
    InPreparation,
    /// The resource is usable.
    InService,
    /// The contract for the resource has been cancelled.
    Cancelled,
    /// Any other provider value, kept verbatim.
    Other(String),
}

impl From<String> for ResourceStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "InPreparation" => Self::InPreparation,
            "InService" => Self::InService,
            "Cancelled" => Self::Cancelled,
            _ => Self::Other(value),
        }
    }
}

impl From<ResourceStatus> for String {
    fn from(value: ResourceStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InPreparation => f.write_str("InPreparation"),
            Self::InService => f.write_str("InService"),
            Self::Cancelled => f.write_str("Cancelled"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Whether a storage resource is bound to a virtual server.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "String", into = "String")]
pub enum AttachmentStatus {
    /// Bound to a server.
    Attached,
    /// Free.
    NotAttached,
    /// Transitional or unknown provider value, kept verbatim.
    Other(String),
}

impl From<String> for AttachmentStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Attached" => Self::Attached,
            "NotAttached" => Self::NotAttached,
            _ => Self::Other(value),
        }
    }
}

impl From<AttachmentStatus> for String {
    fn from(value: AttachmentStatus) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AttachmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attached => f.write_str("Attached"),
            Self::NotAttached => f.write_str("NotAttached"),
            Self::Other(raw) => f.write_str(raw),
        }
    }
}

/// Target pair a convergence wait blocks on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Convergence {
    /// Required service status.
    pub status: ResourceStatus,
    /// Required attachment state.
    pub attachment: AttachmentStatus,
}

impl Convergence {
    /// In service with the given attachment.
    #[must_use]
    pub const fn in_service(attachment: AttachmentStatus) -> Self {
        Self {
            status: ResourceStatus::InService,
            attachment,
        }
    }

    /// In service and free; the only state in which storage can be cancelled.
    #[must_use]
    pub const fn detached() -> Self {
        Self::in_service(AttachmentStatus::NotAttached)
    }

    /// Returns `true` when the snapshot matches both halves of the target.
    #[must_use]
    pub fn is_reached_by(&self, info: &StorageInfo) -> bool {
        info.status == self.status && info.attachment == self.attachment
    }
}

impl fmt::Display for Convergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.status, self.attachment)
    }
}

/// Observed provider snapshot of one storage resource.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageInfo {
    /// Provider identity.
    pub resource_id: ResourceId,
    /// Service status.
    pub status: ResourceStatus,
    /// Attachment state.
    pub attachment: AttachmentStatus,
    /// Server the storage is bound to; present iff `attachment` is `Attached`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attached_server: Option<ServerId>,
    /// Storage type code.
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Storage group the provider placed the volume in.
    #[serde(default)]
    pub storage_group: String,
    /// Operating system family installed on the volume.
    #[serde(default)]
    pub os_type: String,
    /// Capacity as reported by the provider.
    #[serde(default)]
    pub storage_size: String,
    /// Free-form label.
    #[serde(default)]
    pub label: String,
    /// Encryption flag; only meaningful for extended types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    /// Provider mode string.
    #[serde(default)]
    pub mode: String,
}

impl StorageInfo {
    /// Returns `true` when the provider reports the storage as attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attachment == AttachmentStatus::Attached
    }
}

/// Image to restore into freshly created storage.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SourceImage {
    /// Contract owning the archive; must be the reconciling contract.
    pub owner_contract_id: ContractId,
    /// Archive holding the image.
    pub archive_id: ArchiveId,
    /// Image to restore.
    pub image_id: ImageId,
}

/// Desired (or observed) state of one storage volume.
///
/// Secrets are write-only: they deserialise from declarations but never
/// serialise, so they cannot reach the state store or command output.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct StorageDescriptor {
    /// Storage type code, immutable after creation.
    #[serde(rename = "type")]
    pub storage_type: String,
    /// Storage group; provider-assigned when empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_group: Option<String>,
    /// Observed only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_type: Option<String>,
    /// Observed only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_size: Option<String>,
    /// Free-form label; the only attribute updated without side effects.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Creation-only, extended types only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<String>,
    /// Observed only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Public key installed for the root account.
    #[serde(default, skip_serializing)]
    pub root_ssh_key: Option<String>,
    /// Root account password.
    #[serde(default, skip_serializing)]
    pub root_password: Option<String>,
    /// User data handed to the guest on boot.
    #[serde(default, skip_serializing)]
    pub user_data: Option<String>,
    /// Creation-only image restore.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<SourceImage>,
}

impl StorageDescriptor {
    /// Starts a descriptor for the given storage type.
    #[must_use]
    pub fn new(storage_type: impl Into<String>) -> Self {
        Self {
            storage_type: storage_type.into(),
            ..Self::default()
        }
    }

    /// Sets the storage group.
    #[must_use]
    pub fn storage_group(mut self, value: impl Into<String>) -> Self {
        self.storage_group = Some(value.into());
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, value: impl Into<String>) -> Self {
        self.label = Some(value.into());
        self
    }

    /// Sets the encryption flag.
    #[must_use]
    pub fn encryption(mut self, value: impl Into<String>) -> Self {
        self.encryption = Some(value.into());
        self
    }

    /// Sets the root SSH key.
    #[must_use]
    pub fn root_ssh_key(mut self, value: impl Into<String>) -> Self {
        self.root_ssh_key = Some(value.into());
        self
    }

    /// Sets the root password.
    #[must_use]
    pub fn root_password(mut self, value: impl Into<String>) -> Self {
        self.root_password = Some(value.into());
        self
    }

    /// Sets the user data.
    #[must_use]
    pub fn user_data(mut self, value: impl Into<String>) -> Self {
        self.user_data = Some(value.into());
        self
    }

    /// Sets the image to restore at creation.
    #[must_use]
    pub fn source_image(mut self, value: SourceImage) -> Self {
        self.source_image = Some(value);
        self
    }

    /// Projects a provider snapshot into a descriptor.
    ///
    /// `encryption` is only carried for extended types so a stale value from
    /// a type change never surfaces. Secrets and `source_image` stay empty.
    #[must_use]
    pub fn observed(info: &StorageInfo) -> Self {
        let encryption = if is_extended(&info.storage_type) {
            info.encryption.clone()
        } else {
            None
        };
        Self {
            storage_type: info.storage_type.clone(),
            storage_group: Some(info.storage_group.clone()),
            os_type: Some(info.os_type.clone()),
            storage_size: Some(info.storage_size.clone()),
            label: Some(info.label.clone()),
            encryption,
            mode: Some(info.mode.clone()),
            root_ssh_key: None,
            root_password: None,
            user_data: None,
            source_image: None,
        }
    }

    /// Encryption value to send on create, or `None` for non-extended types.
    #[must_use]
    pub fn encryption_for_create(&self) -> Option<String> {
        if !is_extended(&self.storage_type) {
            return None;
        }
        Some(
            non_empty(self.encryption.as_ref())
                .unwrap_or(DEFAULT_ENCRYPTION)
                .to_owned(),
        )
    }

    /// Returns the mutable fields that differ from `previous`.
    #[must_use]
    pub fn changes_from(&self, previous: &Self) -> FieldChanges {
        let mut changed = Vec::new();
        for field in MutableField::ALL {
            if field.value(self) != field.value(previous) {
                changed.push(field);
            }
        }
        FieldChanges { changed }
    }

    /// Names the creation-only attributes that differ from `previous`.
    #[must_use]
    pub fn immutable_drift(&self, previous: &Self) -> Vec<&'static str> {
        let mut drift = Vec::new();
        if self.storage_type != previous.storage_type {
            drift.push("type");
        }
        if non_empty(self.storage_group.as_ref()).is_some()
            && self.storage_group != previous.storage_group
        {
            drift.push("storage_group");
        }
        if is_extended(&self.storage_type)
            && non_empty(self.encryption.as_ref()).is_some()
            && self.encryption != previous.encryption
        {
            drift.push("encryption");
        }
        if self.source_image.is_some() && self.source_image != previous.source_image {
            drift.push("source_image");
        }
        drift
    }

    /// Copy of the descriptor with every write-only field cleared.
    #[must_use]
    pub fn without_secrets(&self) -> Self {
        Self {
            root_ssh_key: None,
            root_password: None,
            user_data: None,
            ..self.clone()
        }
    }
}

/// Attributes an update can change in place.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutableField {
    /// `label`
    Label,
    /// `root_ssh_key`
    RootSshKey,
    /// `root_password`
    RootPassword,
    /// `user_data`
    UserData,
}

impl MutableField {
    /// Fixed application order for create and update.
    pub const ALL: [Self; 4] = [
        Self::Label,
        Self::RootSshKey,
        Self::RootPassword,
        Self::UserData,
    ];

    /// Field name as it appears in descriptors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Label => "label",
            Self::RootSshKey => "root_ssh_key",
            Self::RootPassword => "root_password",
            Self::UserData => "user_data",
        }
    }

    /// Returns `true` when changing the field on attached storage requires
    /// the server to be powered off.
    #[must_use]
    pub const fn needs_power_off(self) -> bool {
        self.is_secret()
    }

    /// Returns `true` for write-only fields that a read never reports.
    #[must_use]
    pub const fn is_secret(self) -> bool {
        !matches!(self, Self::Label)
    }

    /// Declared value, with unset and empty treated alike.
    #[must_use]
    pub fn value(self, descriptor: &StorageDescriptor) -> &str {
        let raw = match self {
            Self::Label => descriptor.label.as_ref(),
            Self::RootSshKey => descriptor.root_ssh_key.as_ref(),
            Self::RootPassword => descriptor.root_password.as_ref(),
            Self::UserData => descriptor.user_data.as_ref(),
        };
        raw.map_or("", String::as_str)
    }

    /// Replaces the field's value on `descriptor`.
    pub fn assign(self, descriptor: &mut StorageDescriptor, value: Option<String>) {
        let slot = match self {
            Self::Label => &mut descriptor.label,
            Self::RootSshKey => &mut descriptor.root_ssh_key,
            Self::RootPassword => &mut descriptor.root_password,
            Self::UserData => &mut descriptor.user_data,
        };
        *slot = value;
    }
}

impl fmt::Display for MutableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable fields that differ between two descriptors, in application order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FieldChanges {
    changed: Vec<MutableField>,
}

impl FieldChanges {
    /// Returns `true` when nothing needs applying.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Returns `true` when `field` changed.
    #[must_use]
    pub fn contains(&self, field: MutableField) -> bool {
        self.changed.contains(&field)
    }

    /// Iterates over changed fields in application order.
    pub fn iter(&self) -> impl Iterator<Item = MutableField> + '_ {
        self.changed.iter().copied()
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|raw| !raw.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(storage_type: &str, encryption: Option<&str>) -> StorageInfo {
        StorageInfo {
            resource_id: ResourceId::from("iba00000001"),
            status: ResourceStatus::InService,
            attachment: AttachmentStatus::NotAttached,
            attached_server: None,
            storage_type: storage_type.to_owned(),
            storage_group: String::from("Z"),
            os_type: String::from("Linux"),
            storage_size: String::from("100"),
            label: String::from("web"),
            encryption: encryption.map(str::to_owned),
            mode: String::from("Basic"),
        }
    }

    #[test]
    fn observed_drops_encryption_for_non_extended_types() {
        let observed = StorageDescriptor::observed(&info("S30GB_UBUNTU", Some("Yes")));
        assert_eq!(observed.encryption, None);
        assert_eq!(observed.label.as_deref(), Some("web"));
    }

    #[test]
    fn observed_keeps_encryption_for_extended_types() {
        let observed = StorageDescriptor::observed(&info("SX30GB_UBUNTU", Some("Yes")));
        assert_eq!(observed.encryption.as_deref(), Some("Yes"));
    }

    #[test]
    fn encryption_defaults_to_no_for_extended_types() {
        let descriptor = StorageDescriptor::new("SX100");
        assert_eq!(descriptor.encryption_for_create().as_deref(), Some("No"));
        let empty = StorageDescriptor::new("SX100").encryption("");
        assert_eq!(empty.encryption_for_create().as_deref(), Some("No"));
    }

    #[test]
    fn encryption_is_never_sent_for_standard_types() {
        let descriptor = StorageDescriptor::new("S100").encryption("Yes");
        assert_eq!(descriptor.encryption_for_create(), None);
    }

    #[test]
    fn changes_treat_unset_and_empty_alike() {
        let previous = StorageDescriptor::new("S100");
        let desired = StorageDescriptor::new("S100").label("");
        assert!(desired.changes_from(&previous).is_empty());
    }

    #[test]
    fn changes_are_reported_in_application_order() {
        let previous = StorageDescriptor::new("S100").label("old");
        let desired = StorageDescriptor::new("S100")
            .user_data("#!/bin/sh")
            .root_password("hunter2")
            .label("new");
        let changes = desired.changes_from(&previous);
        let order: Vec<_> = changes.iter().collect();
        assert_eq!(
            order,
            vec![
                MutableField::Label,
                MutableField::RootPassword,
                MutableField::UserData
            ]
        );
    }

    #[test]
    fn secrets_never_serialise() {
        let descriptor = StorageDescriptor::new("S100")
            .root_ssh_key("ssh-ed25519 AAAA")
            .root_password("hunter2")
            .user_data("#cloud-config");
        let json = serde_json::to_string(&descriptor).expect("serialise");
        assert!(!json.contains("hunter2"), "json: {json}");
        assert!(!json.contains("ssh-ed25519"), "json: {json}");
        assert!(!json.contains("cloud-config"), "json: {json}");
        assert!(json.contains(r#""type":"S100""#), "json: {json}");
    }

    #[test]
    fn secrets_deserialise_from_declarations() {
        let raw = r#"{"type":"S100","root_password":"hunter2","label":"db"}"#;
        let descriptor: StorageDescriptor = serde_json::from_str(raw).expect("deserialise");
        assert_eq!(descriptor.root_password.as_deref(), Some("hunter2"));
        assert_eq!(descriptor.label.as_deref(), Some("db"));
    }

    #[test]
    fn statuses_keep_unknown_provider_values() {
        let status = ResourceStatus::from(String::from("Initializing"));
        assert_eq!(status, ResourceStatus::Other(String::from("Initializing")));
        assert_eq!(status.to_string(), "Initializing");
        let attachment = AttachmentStatus::from(String::from("Attached"));
        assert_eq!(attachment, AttachmentStatus::Attached);
    }

    #[test]
    fn immutable_drift_names_changed_creation_fields() {
        let previous = StorageDescriptor::new("S100").storage_group("Y");
        let desired = StorageDescriptor::new("S200").storage_group("Z");
        assert_eq!(desired.immutable_drift(&previous), vec!["type", "storage_group"]);
    }
}

//! Closed set of remote operations and their typed payloads.

use serde::{Deserialize, Serialize};

use crate::storage::{
    ArchiveId, ContractId, ImageId, ResourceId, ServerId, SourceImage, StorageInfo,
};

/// Power state requested for a virtual server.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum PowerState {
    /// Boot the server.
    On,
    /// Shut the server down.
    Off,
}

/// Image source tag carried by restore and copy requests.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ImageSource {
    /// Restore from an image archive.
    Archive,
    /// Copy an image between archives.
    Copy,
}

/// One remote operation against the storage service.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "kebab-case")]
pub enum Operation {
    /// Provision a new storage resource.
    CreateStorage {
        /// Storage type code.
        #[serde(rename = "type")]
        storage_type: String,
        /// Requested storage group; empty lets the provider choose.
        #[serde(skip_serializing_if = "Option::is_none")]
        storage_group: Option<String>,
        /// Encryption flag, only sent for extended types.
        #[serde(skip_serializing_if = "Option::is_none")]
        encryption: Option<String>,
    },
    /// Fetch the current snapshot.
    GetStorageInfo {
        /// Target storage.
        resource_id: ResourceId,
    },
    /// Replace the label.
    SetLabel {
        /// Target storage.
        resource_id: ResourceId,
        /// New label.
        label: String,
    },
    /// Install a root public key.
    AddPublicKey {
        /// Target storage.
        resource_id: ResourceId,
        /// Public key in OpenSSH format.
        public_key: String,
    },
    /// Replace the root password.
    SetPassword {
        /// Target storage.
        resource_id: ResourceId,
        /// New password.
        password: String,
    },
    /// Replace the user data.
    SetUserData {
        /// Target storage.
        resource_id: ResourceId,
        /// New user data.
        user_data: String,
    },
    /// Restore an archived image onto the storage.
    RestoreFromArchive {
        /// Target storage.
        resource_id: ResourceId,
        /// Always [`ImageSource::Archive`].
        image: ImageSource,
        /// Archive holding the image.
        archive_id: ArchiveId,
        /// Image to restore.
        image_id: ImageId,
    },
    /// Copy an image into an archive owned by another contract.
    CopyImage {
        /// Contract owning the source archive.
        source_contract_id: ContractId,
        /// Source archive.
        source_archive_id: ArchiveId,
        /// Image to copy.
        source_image_id: ImageId,
        /// Contract receiving the copy.
        destination_contract_id: ContractId,
        /// Archive receiving the copy.
        destination_archive_id: ArchiveId,
        /// Always [`ImageSource::Copy`].
        image: ImageSource,
    },
    /// Power a virtual server on or off. Blocks until the provider accepts.
    PowerTransition {
        /// Server to transition.
        server_id: ServerId,
        /// Requested state.
        power: PowerState,
    },
    /// Cancel the storage contract, destroying the resource.
    CancelStorage {
        /// Target storage.
        resource_id: ResourceId,
    },
}

impl Operation {
    /// Builds a restore request for `image`.
    #[must_use]
    pub fn restore(resource_id: ResourceId, image: &SourceImage) -> Self {
        Self::RestoreFromArchive {
            resource_id,
            image: ImageSource::Archive,
            archive_id: image.archive_id.clone(),
            image_id: image.image_id.clone(),
        }
    }

    /// Builds a copy request moving `source` into `destination_archive_id`
    /// under `destination_contract_id`.
    #[must_use]
    pub fn copy_image(
        source: &SourceImage,
        destination_contract_id: ContractId,
        destination_archive_id: ArchiveId,
    ) -> Self {
        Self::CopyImage {
            source_contract_id: source.owner_contract_id.clone(),
            source_archive_id: source.archive_id.clone(),
            source_image_id: source.image_id.clone(),
            destination_contract_id,
            destination_archive_id,
            image: ImageSource::Copy,
        }
    }

    /// Stable operation name used in logs, errors, and the wire tag.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateStorage { .. } => "create-storage",
            Self::GetStorageInfo { .. } => "get-storage-info",
            Self::SetLabel { .. } => "set-label",
            Self::AddPublicKey { .. } => "add-public-key",
            Self::SetPassword { .. } => "set-password",
            Self::SetUserData { .. } => "set-user-data",
            Self::RestoreFromArchive { .. } => "restore-from-archive",
            Self::CopyImage { .. } => "copy-image",
            Self::PowerTransition { .. } => "power-transition",
            Self::CancelStorage { .. } => "cancel-storage",
        }
    }

    /// Storage the operation targets, when it targets one.
    #[must_use]
    pub const fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Self::GetStorageInfo { resource_id }
            | Self::SetLabel { resource_id, .. }
            | Self::AddPublicKey { resource_id, .. }
            | Self::SetPassword { resource_id, .. }
            | Self::SetUserData { resource_id, .. }
            | Self::RestoreFromArchive { resource_id, .. }
            | Self::CancelStorage { resource_id } => Some(resource_id),
            Self::CreateStorage { .. } | Self::CopyImage { .. } | Self::PowerTransition { .. } => {
                None
            }
        }
    }
}

/// An operation scoped to the calling contract.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Request {
    /// Contract the call is made under.
    pub contract_id: ContractId,
    /// Operation and payload.
    #[serde(flatten)]
    pub operation: Operation,
}

impl Request {
    /// Scopes `operation` to `contract_id`.
    #[must_use]
    pub const fn new(contract_id: ContractId, operation: Operation) -> Self {
        Self {
            contract_id,
            operation,
        }
    }
}

/// Typed result of a remote operation.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Reply {
    /// `create-storage` assigned an identity.
    Created {
        /// New storage identity.
        resource_id: ResourceId,
    },
    /// `get-storage-info` snapshot.
    Info(StorageInfo),
    /// `copy-image` result.
    ImageCopied {
        /// Archive now holding the copy.
        archive_id: ArchiveId,
        /// Identity of the copy.
        image_id: ImageId,
    },
    /// Mutation accepted with no payload.
    Accepted,
}

impl Reply {
    /// Variant name used when a reply does not match its operation.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Created { .. } => "created",
            Self::Info(_) => "info",
            Self::ImageCopied { .. } => "image-copied",
            Self::Accepted => "accepted",
        }
    }
}

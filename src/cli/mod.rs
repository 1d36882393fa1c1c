//! Command-line interface definitions for the `stowage` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use std::path::PathBuf;

use clap::{Args, Parser};

/// Top-level CLI for the `stowage` binary.
#[derive(Debug, Parser)]
#[command(
    name = "stowage",
    about = "Reconcile declared system storage against the provider",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision storage from a descriptor file and record it.
    #[command(name = "create", about = "Provision storage from a descriptor file")]
    Create(FileArgs),
    /// Refresh the recorded state of storage from the provider.
    #[command(name = "read", about = "Read storage state from the provider")]
    Read(IdArgs),
    /// Apply label and credential changes from a descriptor file.
    #[command(name = "update", about = "Apply changes from a descriptor file")]
    Update(UpdateArgs),
    /// Cancel detached storage and forget it.
    #[command(name = "delete", about = "Cancel detached storage")]
    Delete(IdArgs),
    /// Start managing storage created elsewhere.
    #[command(name = "import", about = "Adopt existing storage by identifier")]
    Import(IdArgs),
    /// Copy an image from another contract's archive into this contract.
    #[command(name = "copy-image", about = "Copy an image into this contract")]
    CopyImage(CopyImageArgs),
}

/// Arguments naming a descriptor file.
#[derive(Args, Debug)]
pub(crate) struct FileArgs {
    /// JSON storage descriptor.
    #[arg(long, value_name = "PATH")]
    pub(crate) file: PathBuf,
}

/// Arguments naming one storage resource.
#[derive(Args, Debug)]
pub(crate) struct IdArgs {
    /// Provider resource identifier.
    #[arg(value_name = "RESOURCE_ID")]
    pub(crate) resource_id: String,
}

/// Arguments for `stowage update`.
#[derive(Args, Debug)]
pub(crate) struct UpdateArgs {
    /// Provider resource identifier.
    #[arg(value_name = "RESOURCE_ID")]
    pub(crate) resource_id: String,
    /// JSON storage descriptor holding the desired state.
    #[arg(long, value_name = "PATH")]
    pub(crate) file: PathBuf,
}

/// Arguments for `stowage copy-image`.
#[derive(Args, Debug)]
pub(crate) struct CopyImageArgs {
    /// Contract owning the source archive.
    #[arg(long, value_name = "CONTRACT_ID")]
    pub(crate) source_contract: String,
    /// Archive holding the image.
    #[arg(long, value_name = "ARCHIVE_ID")]
    pub(crate) source_archive: String,
    /// Image to copy.
    #[arg(long, value_name = "IMAGE_ID")]
    pub(crate) image: String,
    /// Archive in this contract receiving the copy.
    #[arg(long, value_name = "ARCHIVE_ID")]
    pub(crate) destination_archive: String,
}

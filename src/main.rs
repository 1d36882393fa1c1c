//! Binary entry point for the Stowage CLI.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::Parser;
use serde::Serialize;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

use stowage::storage::{ArchiveId, ContractId, ImageId, MutableField};
use stowage::{
    ConfigError, ConvergenceWaiter, CreateError, Created, HttpStorageApi, PollingWaiter,
    ReconcileContext, ReconcileError, ResourceId, SourceImage, StateRecord, StateStore,
    StateStoreError, StorageApi, StorageDescriptor, StorageReconciler, StowageConfig,
};

mod cli;

use cli::{Cli, CopyImageArgs, FileArgs, IdArgs, UpdateArgs};

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Create(#[from] CreateError),
    #[error("state file error: {0}")]
    State(#[from] StateStoreError),
    #[error("failed to read descriptor {path}: {message}")]
    Descriptor { path: String, message: String },
    #[error("storage {0} is not recorded; run `stowage import {0}` first")]
    NotManaged(ResourceId),
    #[error("failed to write output: {0}")]
    Output(String),
}

struct Session<A, W> {
    reconciler: StorageReconciler<A, W>,
    ctx: ReconcileContext,
    store: StateStore,
}

/// JSON written to stdout by each command.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Output {
    Storage {
        resource_id: ResourceId,
        storage: StorageDescriptor,
    },
    Update {
        resource_id: ResourceId,
        applied: Vec<MutableField>,
        cleared: Vec<MutableField>,
        power_cycled: bool,
    },
    Delete {
        resource_id: ResourceId,
        cancelled: bool,
    },
    Image(SourceImage),
}

#[tokio::main]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("stowage=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let session = http_session(&StowageConfig::load_without_cli_args()?)?;
    let output = session.run(cli).await?;
    emit(&output)
}

fn http_session(
    config: &StowageConfig,
) -> Result<Session<HttpStorageApi, PollingWaiter<HttpStorageApi>>, CliError> {
    config.validate()?;
    let api = HttpStorageApi::from_config(config);
    let waiter = PollingWaiter::new(api.clone(), config.poll_interval());
    Ok(Session {
        reconciler: StorageReconciler::new(api, waiter),
        ctx: config.context(),
        store: StateStore::new(config.state_path()),
    })
}

impl<A, W> Session<A, W>
where
    A: StorageApi,
    W: ConvergenceWaiter,
{
    async fn run(&self, cli: Cli) -> Result<Output, CliError> {
        match cli {
            Cli::Create(args) => self.create(args).await,
            Cli::Read(args) => self.read(args).await,
            Cli::Update(args) => self.update(args).await,
            Cli::Delete(args) => self.delete(args).await,
            Cli::Import(args) => self.import(args).await,
            Cli::CopyImage(args) => self.copy_image(args).await,
        }
    }

    async fn create(&self, args: FileArgs) -> Result<Output, CliError> {
        let desired = read_descriptor(args.file)?;
        match self.reconciler.create(&self.ctx, &desired).await {
            Ok(created) => {
                let record = StateRecord::new(&created_record(&created, &desired))
                    .with_applied_secrets(&desired, MutableField::ALL);
                self.store.record(&created.resource_id, &record)?;
                Ok(Output::Storage {
                    resource_id: created.resource_id,
                    storage: created.observed,
                })
            }
            Err(err) => {
                // Keep the identity so the next update resumes instead of
                // provisioning a duplicate.
                if let Some(resource_id) = err.resource_id() {
                    self.store.record(resource_id, &StateRecord::new(&pending_record(&desired)))?;
                }
                Err(err.into())
            }
        }
    }

    async fn read(&self, args: IdArgs) -> Result<Output, CliError> {
        let resource_id = ResourceId::new(args.resource_id);
        let observed = self.reconciler.read(&self.ctx, &resource_id).await?;
        let record = match self.store.get(&resource_id)? {
            Some(previous) => previous.refreshed(&observed),
            None => StateRecord::new(&observed),
        };
        self.store.record(&resource_id, &record)?;
        Ok(Output::Storage {
            resource_id,
            storage: record.descriptor,
        })
    }

    async fn update(&self, args: UpdateArgs) -> Result<Output, CliError> {
        let resource_id = ResourceId::new(args.resource_id);
        let desired = read_descriptor(args.file)?;
        let record = self
            .store
            .get(&resource_id)?
            .ok_or_else(|| CliError::NotManaged(resource_id.clone()))?;

        let previous = record.previous_for(&desired);
        let report = self
            .reconciler
            .update(&self.ctx, &resource_id, &previous, &desired)
            .await?;
        self.store.record(&resource_id, &record.after_update(&desired, &report))?;
        Ok(Output::Update {
            resource_id,
            applied: report.applied,
            cleared: report.cleared,
            power_cycled: report.power_cycled,
        })
    }

    async fn delete(&self, args: IdArgs) -> Result<Output, CliError> {
        let resource_id = ResourceId::new(args.resource_id);
        self.reconciler.delete(&self.ctx, &resource_id).await?;
        self.store.forget(&resource_id)?;
        Ok(Output::Delete {
            resource_id,
            cancelled: true,
        })
    }

    async fn import(&self, args: IdArgs) -> Result<Output, CliError> {
        let resource_id = StorageReconciler::<A, W>::import(args.resource_id);
        let observed = self.reconciler.read(&self.ctx, &resource_id).await?;
        self.store.record(&resource_id, &StateRecord::new(&observed))?;
        Ok(Output::Storage {
            resource_id,
            storage: observed,
        })
    }

    async fn copy_image(&self, args: CopyImageArgs) -> Result<Output, CliError> {
        let source = SourceImage {
            owner_contract_id: ContractId::new(args.source_contract),
            archive_id: ArchiveId::new(args.source_archive),
            image_id: ImageId::new(args.image),
        };
        let copied = self
            .reconciler
            .copy_image(&self.ctx, &source, &ArchiveId::new(args.destination_archive))
            .await?;
        Ok(Output::Image(copied))
    }
}

/// Record after a successful create: the observed state plus the restored
/// image, which a read can never report.
fn created_record(created: &Created, desired: &StorageDescriptor) -> StorageDescriptor {
    StorageDescriptor {
        source_image: desired.source_image.clone(),
        ..created.observed.clone()
    }
}

/// Record for storage whose create pass stopped part way: creation-only
/// attributes as declared, mutable fields left unset so the next update
/// applies them.
fn pending_record(desired: &StorageDescriptor) -> StorageDescriptor {
    StorageDescriptor {
        label: None,
        ..desired.without_secrets()
    }
}

fn read_descriptor(raw_path: PathBuf) -> Result<StorageDescriptor, CliError> {
    let path = Utf8PathBuf::from_path_buf(raw_path).map_err(|raw| CliError::Descriptor {
        path: raw.display().to_string(),
        message: String::from("path is not valid UTF-8"),
    })?;
    let descriptor_error = |message: String| CliError::Descriptor {
        path: path.to_string(),
        message,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_str().is_empty() => parent,
        _ => Utf8Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| descriptor_error(String::from("path is missing a filename")))?;
    let dir = Dir::open_ambient_dir(parent, ambient_authority())
        .map_err(|err| descriptor_error(err.to_string()))?;
    let contents = dir
        .read_to_string(file_name)
        .map_err(|err| descriptor_error(err.to_string()))?;
    serde_json::from_str(&contents).map_err(|err| descriptor_error(err.to_string()))
}

fn emit(value: &impl Serialize) -> Result<(), CliError> {
    write_json(io::stdout(), value)
}

fn write_json(mut target: impl Write, value: &impl Serialize) -> Result<(), CliError> {
    let rendered =
        serde_json::to_string_pretty(value).map_err(|err| CliError::Output(err.to_string()))?;
    writeln!(target, "{rendered}").map_err(|err| CliError::Output(err.to_string()))
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;

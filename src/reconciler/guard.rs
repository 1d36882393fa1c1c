//! Power bracket for mutations on attached storage.
//!
//! Credential and user-data changes are only legal while the owning server is
//! off. A [`PowerBracket`] lives for exactly one update pass: the first field
//! that needs it powers the server off, later fields reuse that state, and
//! [`PowerBracket::release`] powers the server back on once, only if this
//! pass powered it off.

use tracing::info;

use super::steps::accept;
use super::{ReconcileContext, ReconcileError};
use crate::api::{Operation, PowerState, StorageApi};
use crate::storage::{ServerId, StorageInfo};

#[derive(Debug, Eq, PartialEq)]
pub(super) struct PowerBracket {
    server: Option<ServerId>,
    powered_off: bool,
}

impl PowerBracket {
    /// Opens a bracket for the snapshot taken at the start of the pass.
    pub(super) fn for_storage(info: &StorageInfo) -> Result<Self, ReconcileError> {
        if !info.is_attached() {
            return Ok(Self {
                server: None,
                powered_off: false,
            });
        }
        let server = info
            .attached_server
            .clone()
            .ok_or_else(|| ReconcileError::MissingAttachedServer {
                resource_id: info.resource_id.clone(),
            })?;
        Ok(Self {
            server: Some(server),
            powered_off: false,
        })
    }

    pub(super) const fn powered_off(&self) -> bool {
        self.powered_off
    }

    pub(super) const fn server(&self) -> Option<&ServerId> {
        self.server.as_ref()
    }

    /// Powers the attached server off unless it is detached or already off.
    pub(super) async fn ensure_powered_off<A>(
        &mut self,
        api: &A,
        ctx: &ReconcileContext,
    ) -> Result<(), ReconcileError>
    where
        A: StorageApi + ?Sized,
    {
        let Some(server) = self.server.as_ref() else {
            return Ok(());
        };
        if self.powered_off {
            return Ok(());
        }
        transition(api, ctx, server, PowerState::Off).await?;
        self.powered_off = true;
        Ok(())
    }

    /// Closes the bracket, returning `true` when the server was power cycled.
    pub(super) async fn release<A>(
        self,
        api: &A,
        ctx: &ReconcileContext,
    ) -> Result<bool, ReconcileError>
    where
        A: StorageApi + ?Sized,
    {
        match self.server {
            Some(server) if self.powered_off => {
                transition(api, ctx, &server, PowerState::On).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

async fn transition<A>(
    api: &A,
    ctx: &ReconcileContext,
    server: &ServerId,
    power: PowerState,
) -> Result<(), ReconcileError>
where
    A: StorageApi + ?Sized,
{
    accept(
        api,
        ctx,
        Operation::PowerTransition {
            server_id: server.clone(),
            power,
        },
    )
    .await?;
    info!(server_id = %server, power = ?power, "server power transitioned");
    Ok(())
}

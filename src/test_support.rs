//! Test support utilities shared across unit and integration tests.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::api::wait::{ConvergenceWaiter, WaitError};
use crate::api::{ApiError, ApiFuture, Operation, PowerState, Reply, Request, StorageApi};
use crate::storage::{
    AttachmentStatus, ContractId, Convergence, ResourceId, ResourceStatus, ServerId,
    StorageDescriptor, StorageInfo, is_extended,
};

/// Interaction recorded by [`FakeStorageService`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A remote call, in issue order.
    Call(Operation),
    /// A convergence wait.
    Wait {
        /// Storage waited on.
        resource_id: ResourceId,
        /// Target pair.
        target: Convergence,
    },
}

#[derive(Debug, Default)]
struct FakeState {
    next_id: u32,
    resources: BTreeMap<ResourceId, StorageInfo>,
    settle_after: BTreeMap<ResourceId, u32>,
    failing: BTreeSet<&'static str>,
    flipping: BTreeSet<&'static str>,
    stalled: bool,
    events: Vec<Event>,
}

/// In-memory storage service implementing both [`StorageApi`] and
/// [`ConvergenceWaiter`].
///
/// Mutations apply immediately, so waits succeed as soon as the snapshot
/// matches. Clones share state, which lets tests hand one copy to the
/// reconciler and inspect another.
#[derive(Clone, Debug)]
pub struct FakeStorageService {
    contract_id: ContractId,
    state: Arc<Mutex<FakeState>>,
}

impl FakeStorageService {
    /// Creates an empty service scoped to `contract_id`.
    #[must_use]
    pub fn new(contract_id: ContractId) -> Self {
        Self {
            contract_id,
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts in-service, detached storage shaped like `descriptor`.
    #[must_use]
    pub fn seed(&self, descriptor: &StorageDescriptor) -> ResourceId {
        let mut state = self.lock();
        let info = provision(&mut state, descriptor);
        let id = info.resource_id.clone();
        state.resources.insert(id.clone(), info);
        id
    }

    /// Marks storage as attached to `server`.
    pub fn attach(&self, resource_id: &ResourceId, server: &ServerId) {
        if let Some(info) = self.lock().resources.get_mut(resource_id) {
            info.attachment = AttachmentStatus::Attached;
            info.attached_server = Some(server.clone());
        }
    }

    /// Overrides the reported service status.
    pub fn set_status(&self, resource_id: &ResourceId, status: ResourceStatus) {
        if let Some(info) = self.lock().resources.get_mut(resource_id) {
            info.status = status;
        }
    }

    /// Reports the current status for `reads` more snapshots, then
    /// `InService`.
    pub fn settle_after(&self, resource_id: &ResourceId, reads: u32) {
        self.lock().settle_after.insert(resource_id.clone(), reads);
    }

    /// Makes every call of the named operation fail with a provider error.
    pub fn fail_operation(&self, name: &'static str) {
        self.lock().failing.insert(name);
    }

    /// Makes every accepted call of the named operation toggle the target's
    /// attachment, as a provider-side side effect would.
    pub fn flip_attachment_on(&self, name: &'static str) {
        self.lock().flipping.insert(name);
    }

    /// Makes every subsequent wait time out.
    pub fn stall_convergence(&self) {
        self.lock().stalled = true;
    }

    /// Every interaction so far, in order.
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Every remote call so far, in order.
    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Call(operation) => Some(operation.clone()),
                Event::Wait { .. } => None,
            })
            .collect()
    }

    /// Names of remote calls, excluding snapshot reads.
    #[must_use]
    pub fn mutation_names(&self) -> Vec<&'static str> {
        self.operations()
            .iter()
            .map(Operation::name)
            .filter(|name| *name != "get-storage-info")
            .collect()
    }

    /// Number of calls of the named operation.
    #[must_use]
    pub fn count(&self, name: &str) -> usize {
        self.operations()
            .iter()
            .filter(|operation| operation.name() == name)
            .count()
    }

    /// Every wait target so far, in order.
    #[must_use]
    pub fn waits(&self) -> Vec<Convergence> {
        self.lock()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Wait { target, .. } => Some(target.clone()),
                Event::Call(_) => None,
            })
            .collect()
    }

    /// Power transitions issued so far, in order.
    #[must_use]
    pub fn power_transitions(&self) -> Vec<(ServerId, PowerState)> {
        self.operations()
            .into_iter()
            .filter_map(|operation| match operation {
                Operation::PowerTransition { server_id, power } => Some((server_id, power)),
                _ => None,
            })
            .collect()
    }

    /// Current snapshot without recording a call.
    #[must_use]
    pub fn info(&self, resource_id: &ResourceId) -> Option<StorageInfo> {
        self.lock().resources.get(resource_id).cloned()
    }

    fn handle(&self, request: Request) -> Result<Reply, ApiError> {
        let mut state = self.lock();
        state.events.push(Event::Call(request.operation.clone()));

        if request.contract_id != self.contract_id {
            return Err(ApiError::Provider {
                status: 403,
                message: format!("contract {} is not accessible", request.contract_id),
            });
        }
        let name = request.operation.name();
        if state.failing.contains(name) {
            return Err(ApiError::Provider {
                status: 500,
                message: format!("{name} failed"),
            });
        }

        let target = request.operation.resource_id().cloned();
        let reply = match request.operation {
            Operation::CreateStorage {
                storage_type,
                storage_group,
                encryption,
            } => {
                let mut descriptor = StorageDescriptor::new(storage_type);
                descriptor.storage_group = storage_group;
                descriptor.encryption = encryption;
                let info = provision(&mut state, &descriptor);
                let resource_id = info.resource_id.clone();
                state.resources.insert(resource_id.clone(), info);
                Ok(Reply::Created { resource_id })
            }
            Operation::GetStorageInfo { resource_id } => {
                let remaining = state.settle_after.get(&resource_id).copied();
                let info = existing(&mut state, &resource_id)?;
                if remaining == Some(0) {
                    info.status = ResourceStatus::InService;
                }
                let snapshot = info.clone();
                match remaining {
                    Some(0) => {
                        state.settle_after.remove(&resource_id);
                    }
                    Some(reads) => {
                        state.settle_after.insert(resource_id, reads - 1);
                    }
                    None => {}
                }
                Ok(Reply::Info(snapshot))
            }
            Operation::SetLabel { resource_id, label } => {
                existing(&mut state, &resource_id)?.label = label;
                Ok(Reply::Accepted)
            }
            Operation::AddPublicKey { resource_id, .. }
            | Operation::SetPassword { resource_id, .. }
            | Operation::SetUserData { resource_id, .. }
            | Operation::RestoreFromArchive { resource_id, .. } => {
                existing(&mut state, &resource_id)?;
                Ok(Reply::Accepted)
            }
            Operation::CopyImage {
                destination_archive_id,
                source_image_id,
                ..
            } => Ok(Reply::ImageCopied {
                archive_id: destination_archive_id,
                image_id: source_image_id,
            }),
            Operation::PowerTransition { .. } => Ok(Reply::Accepted),
            Operation::CancelStorage { resource_id } => {
                existing(&mut state, &resource_id)?.status = ResourceStatus::Cancelled;
                Ok(Reply::Accepted)
            }
        };

        let flips = state.flipping.contains(name);
        if let Some(info) = target
            .filter(|_| flips)
            .and_then(|id| state.resources.get_mut(&id))
        {
            flip_attachment(info);
        }
        reply
    }

    fn check(
        &self,
        resource_id: &ResourceId,
        target: &Convergence,
        timeout: Duration,
    ) -> Result<(), WaitError> {
        let mut state = self.lock();
        state.events.push(Event::Wait {
            resource_id: resource_id.clone(),
            target: target.clone(),
        });
        let timed_out = WaitError::Timeout {
            resource_id: resource_id.clone(),
            target: target.clone(),
            timeout,
        };
        if state.stalled {
            return Err(timed_out);
        }
        match state.resources.get(resource_id) {
            Some(info) if target.is_reached_by(info) => Ok(()),
            Some(_) => Err(timed_out),
            None => Err(WaitError::Api {
                resource_id: resource_id.clone(),
                source: not_found(resource_id),
            }),
        }
    }
}

impl StorageApi for FakeStorageService {
    fn call(&self, request: Request) -> ApiFuture<'_, Reply, ApiError> {
        let reply = self.handle(request);
        Box::pin(async move { reply })
    }
}

impl ConvergenceWaiter for FakeStorageService {
    fn wait_for<'a>(
        &'a self,
        _contract_id: &'a ContractId,
        resource_id: &'a ResourceId,
        target: &'a Convergence,
        timeout: Duration,
    ) -> ApiFuture<'a, (), WaitError> {
        let outcome = self.check(resource_id, target, timeout);
        Box::pin(async move { outcome })
    }
}

fn provision(state: &mut FakeState, descriptor: &StorageDescriptor) -> StorageInfo {
    state.next_id += 1;
    let encryption = if is_extended(&descriptor.storage_type) {
        descriptor.encryption_for_create()
    } else {
        None
    };
    StorageInfo {
        resource_id: ResourceId::new(format!("iba{:08}", state.next_id)),
        status: ResourceStatus::InService,
        attachment: AttachmentStatus::NotAttached,
        attached_server: None,
        storage_type: descriptor.storage_type.clone(),
        storage_group: descriptor
            .storage_group
            .clone()
            .filter(|group| !group.is_empty())
            .unwrap_or_else(|| String::from("Z")),
        os_type: String::from("Linux"),
        storage_size: String::from("100"),
        label: descriptor.label.clone().unwrap_or_default(),
        encryption,
        mode: String::from("Basic"),
    }
}

fn flip_attachment(info: &mut StorageInfo) {
    if info.is_attached() {
        info.attachment = AttachmentStatus::NotAttached;
        info.attached_server = None;
    } else {
        info.attachment = AttachmentStatus::Attached;
        info.attached_server = Some(ServerId::from("ivm99999999"));
    }
}

fn existing<'s>(
    state: &'s mut FakeState,
    resource_id: &ResourceId,
) -> Result<&'s mut StorageInfo, ApiError> {
    state
        .resources
        .get_mut(resource_id)
        .ok_or_else(|| not_found(resource_id))
}

fn not_found(resource_id: &ResourceId) -> ApiError {
    ApiError::Provider {
        status: 404,
        message: format!("storage {resource_id} not found"),
    }
}

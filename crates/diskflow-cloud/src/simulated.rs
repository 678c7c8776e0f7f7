//! In-memory disk provider
//!
//! Deterministic stand-in for a real cloud. Disks live in a map, every call
//! is counted, provisioning can be made to lag behind for a number of polls,
//! and failures can be scripted per operation.
//!
//! With a snapshot file the disks outlive the process, so separate CLI
//! invocations see the same simulated cloud.

use crate::client::{DiskClient, DiskOperation};
use crate::disk::{DiskHandle, DiskState, ProvisioningState};
use crate::error::{CloudError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

type DiskKey = (String, String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
enum Settle {
    To(ProvisioningState),
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SimDisk {
    handle: DiskHandle,
    size_gb: u32,
    sku: String,
    location: String,
    attachment: Option<(String, u32)>,
    provisioning: ProvisioningState,
    polls_until_settled: u32,
    settle: Settle,
}

#[derive(Debug, Clone)]
enum Injected {
    /// Fail without touching the disk
    Reject(CloudError),
    /// Apply the operation, then report the error (lost response)
    ApplyThenFail(CloudError),
}

#[derive(Debug, Default)]
struct SimState {
    disks: HashMap<DiskKey, SimDisk>,
    foreign_luns: HashSet<(String, String, u32)>,
    scripted: HashMap<DiskOperation, VecDeque<Injected>>,
    persistent: HashMap<DiskOperation, CloudError>,
    failing_provisioning: HashSet<DiskOperation>,
    calls: HashMap<DiskOperation, usize>,
    settle_polls: u32,
}

/// Disks as stored in a snapshot file, keyed by resource group
#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    disks: Vec<(String, SimDisk)>,
}

/// Simulated provider backed by process memory
#[derive(Debug, Default)]
pub struct SimulatedDiskClient {
    state: Mutex<SimState>,
    snapshot: Option<PathBuf>,
}

impl SimulatedDiskClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep the disks in `path`, re-read before and written after every call
    pub fn with_snapshot_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot = Some(path.into());
        self
    }

    /// Report a transitional provisioning state for `polls` reads after each change
    pub fn with_settle_polls(self, polls: u32) -> Self {
        self.lock().settle_polls = polls;
        self
    }

    /// Fail the next call of `op` with `err`, without applying it
    pub fn fail_next(&self, op: DiskOperation, err: CloudError) {
        self.fail_times(op, err, 1);
    }

    /// Fail the next `times` calls of `op` with `err`
    pub fn fail_times(&self, op: DiskOperation, err: CloudError, times: usize) {
        let mut state = self.lock();
        let queue = state.scripted.entry(op).or_default();
        for _ in 0..times {
            queue.push_back(Injected::Reject(err.clone()));
        }
    }

    /// Apply the next call of `op`, then answer with `err` as if the response was lost
    pub fn fail_after_apply(&self, op: DiskOperation, err: CloudError) {
        self.lock()
            .scripted
            .entry(op)
            .or_default()
            .push_back(Injected::ApplyThenFail(err));
    }

    /// Fail every call of `op` with `err`
    pub fn fail_always(&self, op: DiskOperation, err: CloudError) {
        self.lock().persistent.insert(op, err);
    }

    /// The next change made by `op` settles in the `Failed` provisioning state
    pub fn fail_provisioning(&self, op: DiskOperation) {
        self.lock().failing_provisioning.insert(op);
    }

    /// Mark a LUN on a VM as used by a disk this client does not manage
    pub fn occupy_lun(&self, resource_group: &str, vm_name: &str, lun: u32) {
        self.lock().foreign_luns.insert((
            resource_group.to_string(),
            vm_name.to_ascii_lowercase(),
            lun,
        ));
    }

    /// Insert an already provisioned, unattached disk
    pub fn insert_disk(&self, resource_group: &str, name: &str, size_gb: u32, sku: &str) {
        let disk = SimDisk {
            handle: DiskHandle::new(disk_id(resource_group, name), name),
            size_gb,
            sku: sku.to_string(),
            location: "simulated".to_string(),
            attachment: None,
            provisioning: ProvisioningState::Succeeded,
            polls_until_settled: 0,
            settle: Settle::To(ProvisioningState::Succeeded),
        };
        self.lock()
            .disks
            .insert((resource_group.to_string(), name.to_string()), disk);
    }

    /// Number of calls made for `op`, failed ones included
    pub fn call_count(&self, op: DiskOperation) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Current state of a disk as last seen by this client, without counting a
    /// call or advancing provisioning
    pub fn disk(&self, resource_group: &str, name: &str) -> Option<DiskState> {
        self.lock()
            .disks
            .get(&(resource_group.to_string(), name.to_string()))
            .map(SimDisk::to_state)
    }

    pub fn disk_count(&self) -> usize {
        self.lock().disks.len()
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn call<T>(
        &self,
        op: DiskOperation,
        apply: impl FnOnce(&mut SimState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        *state.calls.entry(op).or_default() += 1;

        if let Some(err) = state.persistent.get(&op) {
            return Err(err.clone());
        }

        if let Some(path) = &self.snapshot {
            state.disks = read_snapshot(path)?;
        }

        let injected = state.scripted.get_mut(&op).and_then(VecDeque::pop_front);
        let result = match injected {
            Some(Injected::Reject(err)) => {
                tracing::debug!("simulated {} rejected: {}", op, err);
                return Err(err);
            }
            Some(Injected::ApplyThenFail(err)) => {
                tracing::debug!("simulated {} applied, answering: {}", op, err);
                apply(&mut *state).and(Err(err))
            }
            None => apply(&mut *state),
        };

        if let Some(path) = &self.snapshot {
            write_snapshot(path, &state.disks)?;
        }
        result
    }
}

fn read_snapshot(path: &Path) -> Result<HashMap<DiskKey, SimDisk>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    let snapshot: Snapshot = serde_json::from_str(&content)?;
    Ok(snapshot
        .disks
        .into_iter()
        .map(|(rg, disk)| ((rg, disk.handle.name.clone()), disk))
        .collect())
}

fn write_snapshot(path: &Path, disks: &HashMap<DiskKey, SimDisk>) -> Result<()> {
    let mut entries: Vec<(String, SimDisk)> = disks
        .iter()
        .map(|((rg, _), disk)| (rg.clone(), disk.clone()))
        .collect();
    entries.sort_by(|a, b| (&a.0, &a.1.handle.name).cmp(&(&b.0, &b.1.handle.name)));
    let content = serde_json::to_string_pretty(&Snapshot { disks: entries })?;

    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let temp = path.with_extension("json.tmp");
    std::fs::write(&temp, content)?;
    std::fs::rename(&temp, path)?;
    Ok(())
}

fn disk_id(resource_group: &str, name: &str) -> String {
    format!(
        "/subscriptions/simulated/resourceGroups/{}/providers/Microsoft.Compute/disks/{}",
        resource_group, name
    )
}

fn key(resource_group: &str, name: &str) -> DiskKey {
    (resource_group.to_string(), name.to_string())
}

fn not_found(resource_group: &str, name: &str) -> CloudError {
    CloudError::NotFound(format!(
        "disk '{}' in resource group '{}'",
        name, resource_group
    ))
}

impl SimDisk {
    fn to_state(&self) -> DiskState {
        DiskState {
            handle: self.handle.clone(),
            provisioning_state: self.provisioning,
            size_gb: self.size_gb,
            attached_to: self.attachment.as_ref().map(|(vm, _)| vm.clone()),
            sku: Some(self.sku.clone()),
            location: Some(self.location.clone()),
        }
    }
}

impl SimState {
    /// Put a disk into `transitional` and schedule where it settles
    fn begin_change(&mut self, k: &DiskKey, op: DiskOperation, transitional: ProvisioningState) {
        let target = if self.failing_provisioning.remove(&op) {
            Settle::To(ProvisioningState::Failed)
        } else if op == DiskOperation::Delete {
            Settle::Remove
        } else {
            Settle::To(ProvisioningState::Succeeded)
        };
        let polls = self.settle_polls;

        if polls == 0 {
            match target {
                Settle::Remove => {
                    self.disks.remove(k);
                }
                Settle::To(state) => {
                    if let Some(disk) = self.disks.get_mut(k) {
                        disk.provisioning = state;
                    }
                }
            }
            return;
        }

        if let Some(disk) = self.disks.get_mut(k) {
            disk.provisioning = transitional;
            disk.polls_until_settled = polls;
            disk.settle = target;
        }
    }

    fn lun_taken(&self, resource_group: &str, vm_name: &str, lun: u32, disk_name: &str) -> bool {
        let vm = vm_name.to_ascii_lowercase();
        if self
            .foreign_luns
            .contains(&(resource_group.to_string(), vm.clone(), lun))
        {
            return true;
        }
        self.disks.iter().any(|((rg, name), disk)| {
            rg == resource_group
                && name != disk_name
                && disk
                    .attachment
                    .as_ref()
                    .is_some_and(|(v, l)| v.eq_ignore_ascii_case(&vm) && *l == lun)
        })
    }

    fn create(
        &mut self,
        resource_group: &str,
        name: &str,
        size_gb: u32,
        sku: &str,
        location: &str,
    ) -> Result<DiskHandle> {
        if size_gb == 0 {
            return Err(CloudError::InvalidParameter(
                "disk size must be greater than 0 GB".to_string(),
            ));
        }
        let k = key(resource_group, name);
        if self.disks.contains_key(&k) {
            return Err(CloudError::Conflict(format!(
                "disk '{}' already exists in resource group '{}'",
                name, resource_group
            )));
        }

        let handle = DiskHandle::new(disk_id(resource_group, name), name);
        self.disks.insert(
            k.clone(),
            SimDisk {
                handle: handle.clone(),
                size_gb,
                sku: sku.to_string(),
                location: location.to_string(),
                attachment: None,
                provisioning: ProvisioningState::Creating,
                polls_until_settled: 0,
                settle: Settle::To(ProvisioningState::Succeeded),
            },
        );
        self.begin_change(&k, DiskOperation::Create, ProvisioningState::Creating);
        Ok(handle)
    }

    fn attach(
        &mut self,
        resource_group: &str,
        vm_name: &str,
        disk: &DiskHandle,
        lun: u32,
    ) -> Result<()> {
        let k = key(resource_group, &disk.name);
        let current = self
            .disks
            .get(&k)
            .ok_or_else(|| not_found(resource_group, &disk.name))?;

        if let Some((attached_vm, _)) = &current.attachment {
            if attached_vm.eq_ignore_ascii_case(vm_name) {
                return Ok(());
            }
            return Err(CloudError::Conflict(format!(
                "disk '{}' is already attached to VM '{}'",
                disk.name, attached_vm
            )));
        }

        if self.lun_taken(resource_group, vm_name, lun, &disk.name) {
            return Err(CloudError::Conflict(format!(
                "LUN {} on VM '{}' is already in use",
                lun, vm_name
            )));
        }

        if let Some(d) = self.disks.get_mut(&k) {
            d.attachment = Some((vm_name.to_string(), lun));
        }
        self.begin_change(&k, DiskOperation::Attach, ProvisioningState::Updating);
        Ok(())
    }

    fn resize(&mut self, resource_group: &str, name: &str, new_size_gb: u32) -> Result<()> {
        let k = key(resource_group, name);
        let current = self
            .disks
            .get(&k)
            .ok_or_else(|| not_found(resource_group, name))?;

        if new_size_gb == 0 {
            return Err(CloudError::InvalidParameter(
                "disk size must be greater than 0 GB".to_string(),
            ));
        }
        if new_size_gb < current.size_gb {
            return Err(CloudError::InvalidParameter(format!(
                "disks can only grow: current {} GB, requested {} GB",
                current.size_gb, new_size_gb
            )));
        }

        if let Some(d) = self.disks.get_mut(&k) {
            d.size_gb = new_size_gb;
        }
        self.begin_change(&k, DiskOperation::Resize, ProvisioningState::Updating);
        Ok(())
    }

    fn detach(&mut self, resource_group: &str, vm_name: &str, disk: &DiskHandle) -> Result<()> {
        let k = key(resource_group, &disk.name);
        let current = self
            .disks
            .get(&k)
            .ok_or_else(|| not_found(resource_group, &disk.name))?;

        let attached_here = current
            .attachment
            .as_ref()
            .is_some_and(|(vm, _)| vm.eq_ignore_ascii_case(vm_name));
        if !attached_here {
            return Err(CloudError::NotFound(format!(
                "disk '{}' is not attached to VM '{}'",
                disk.name, vm_name
            )));
        }

        if let Some(d) = self.disks.get_mut(&k) {
            d.attachment = None;
        }
        self.begin_change(&k, DiskOperation::Detach, ProvisioningState::Updating);
        Ok(())
    }

    fn delete(&mut self, resource_group: &str, name: &str) -> Result<()> {
        let k = key(resource_group, name);
        let current = self
            .disks
            .get(&k)
            .ok_or_else(|| not_found(resource_group, name))?;

        if let Some((vm, _)) = &current.attachment {
            return Err(CloudError::Conflict(format!(
                "disk '{}' is attached to VM '{}'",
                name, vm
            )));
        }

        self.begin_change(&k, DiskOperation::Delete, ProvisioningState::Deleting);
        Ok(())
    }

    fn read(&mut self, resource_group: &str, name: &str) -> Result<DiskState> {
        let k = key(resource_group, name);
        let disk = self
            .disks
            .get_mut(&k)
            .ok_or_else(|| not_found(resource_group, name))?;

        if disk.polls_until_settled > 0 {
            disk.polls_until_settled -= 1;
            return Ok(disk.to_state());
        }

        if !disk.provisioning.is_terminal() {
            match disk.settle {
                Settle::Remove => {
                    self.disks.remove(&k);
                    return Err(not_found(resource_group, name));
                }
                Settle::To(state) => disk.provisioning = state,
            }
        }
        Ok(disk.to_state())
    }
}

#[async_trait]
impl DiskClient for SimulatedDiskClient {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn create_disk(
        &self,
        resource_group: &str,
        name: &str,
        size_gb: u32,
        sku: &str,
        location: &str,
    ) -> Result<DiskHandle> {
        self.call(DiskOperation::Create, |s| {
            s.create(resource_group, name, size_gb, sku, location)
        })
    }

    async fn attach_disk(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &DiskHandle,
        lun: u32,
    ) -> Result<()> {
        self.call(DiskOperation::Attach, |s| {
            s.attach(resource_group, vm_name, disk, lun)
        })
    }

    async fn resize_disk(&self, resource_group: &str, name: &str, new_size_gb: u32) -> Result<()> {
        self.call(DiskOperation::Resize, |s| {
            s.resize(resource_group, name, new_size_gb)
        })
    }

    async fn detach_disk(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &DiskHandle,
    ) -> Result<()> {
        self.call(DiskOperation::Detach, |s| {
            s.detach(resource_group, vm_name, disk)
        })
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        self.call(DiskOperation::Delete, |s| s.delete(resource_group, name))
    }

    async fn get_disk_state(&self, resource_group: &str, name: &str) -> Result<DiskState> {
        self.call(DiskOperation::Get, |s| s.read(resource_group, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RG: &str = "rg-test";

    #[tokio::test]
    async fn test_full_lifecycle() {
        let client = SimulatedDiskClient::new();

        let handle = client
            .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
            .await
            .unwrap();
        client.attach_disk(RG, "vm01", &handle, 0).await.unwrap();
        client.resize_disk(RG, "data01", 64).await.unwrap();

        let state = client.get_disk_state(RG, "data01").await.unwrap();
        assert_eq!(state.size_gb, 64);
        assert!(state.is_attached_to("vm01"));

        client.detach_disk(RG, "vm01", &handle).await.unwrap();
        client.delete_disk(RG, "data01").await.unwrap();

        let err = client.get_disk_state(RG, "data01").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(client.disk_count(), 0);
    }

    #[tokio::test]
    async fn test_settle_polls_delay_provisioning() {
        let client = SimulatedDiskClient::new().with_settle_polls(2);
        client
            .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
            .await
            .unwrap();

        let first = client.get_disk_state(RG, "data01").await.unwrap();
        let second = client.get_disk_state(RG, "data01").await.unwrap();
        let third = client.get_disk_state(RG, "data01").await.unwrap();
        assert_eq!(first.provisioning_state, ProvisioningState::Creating);
        assert_eq!(second.provisioning_state, ProvisioningState::Creating);
        assert_eq!(third.provisioning_state, ProvisioningState::Succeeded);
    }

    #[tokio::test]
    async fn test_delete_with_settle_polls_removes_eventually() {
        let client = SimulatedDiskClient::new().with_settle_polls(1);
        client.insert_disk(RG, "data01", 32, "Standard_LRS");
        client.delete_disk(RG, "data01").await.unwrap();

        let deleting = client.get_disk_state(RG, "data01").await.unwrap();
        assert_eq!(deleting.provisioning_state, ProvisioningState::Deleting);
        assert!(
            client
                .get_disk_state(RG, "data01")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_scripted_failures_are_consumed_in_order() {
        let client = SimulatedDiskClient::new();
        client.fail_times(DiskOperation::Create, CloudError::Throttled("429".into()), 2);

        for _ in 0..2 {
            let err = client
                .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
                .await
                .unwrap_err();
            assert_eq!(err.kind(), "throttled");
        }
        client
            .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
            .await
            .unwrap();
        assert_eq!(client.call_count(DiskOperation::Create), 3);
    }

    #[tokio::test]
    async fn test_fail_after_apply_keeps_effect() {
        let client = SimulatedDiskClient::new();
        client.fail_after_apply(DiskOperation::Create, CloudError::Timeout("lost".into()));

        let err = client
            .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert!(client.disk(RG, "data01").is_some());

        let again = client
            .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
            .await
            .unwrap_err();
        assert!(matches!(again, CloudError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_occupied_lun_conflicts() {
        let client = SimulatedDiskClient::new();
        client.insert_disk(RG, "data01", 32, "Standard_LRS");
        client.occupy_lun(RG, "vm01", 0);

        let handle = client.disk(RG, "data01").unwrap().handle;
        let err = client.attach_disk(RG, "vm01", &handle, 0).await.unwrap_err();
        assert!(matches!(err, CloudError::Conflict(_)));
        client.attach_disk(RG, "vm01", &handle, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_resize_rejects_shrink_and_zero() {
        let client = SimulatedDiskClient::new();
        client.insert_disk(RG, "data01", 64, "Standard_LRS");

        let zero = client.resize_disk(RG, "data01", 0).await.unwrap_err();
        let shrink = client.resize_disk(RG, "data01", 32).await.unwrap_err();
        assert!(matches!(zero, CloudError::InvalidParameter(_)));
        assert!(matches!(shrink, CloudError::InvalidParameter(_)));
    }

    #[tokio::test]
    async fn test_failing_provisioning() {
        let client = SimulatedDiskClient::new();
        client.fail_provisioning(DiskOperation::Create);
        client
            .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
            .await
            .unwrap();

        let state = client.get_disk_state(RG, "data01").await.unwrap();
        assert_eq!(state.provisioning_state, ProvisioningState::Failed);
    }

    #[tokio::test]
    async fn test_snapshot_file_shares_disks_between_clients() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("simulated.json");

        let first = SimulatedDiskClient::new().with_snapshot_file(&path);
        let handle = first
            .create_disk(RG, "data01", 32, "Standard_LRS", "eastus")
            .await
            .unwrap();
        first.attach_disk(RG, "vm01", &handle, 0).await.unwrap();
        drop(first);

        let second = SimulatedDiskClient::new().with_snapshot_file(&path);
        let state = second.get_disk_state(RG, "data01").await.unwrap();
        assert_eq!(state.size_gb, 32);
        assert!(state.is_attached_to("vm01"));

        second.detach_disk(RG, "vm01", &handle).await.unwrap();
        second.delete_disk(RG, "data01").await.unwrap();

        let third = SimulatedDiskClient::new().with_snapshot_file(&path);
        assert!(third.get_disk_state(RG, "data01").await.unwrap_err().is_not_found());
    }
}

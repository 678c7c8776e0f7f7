//! Cloud resource client trait definition

use crate::disk::{DiskHandle, DiskState};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Disk management operations a provider must offer
///
/// Credentials are the implementation's concern; callers assume an
/// authenticated session. All operations are scoped by resource group.
#[async_trait]
pub trait DiskClient: Send + Sync {
    /// Returns the provider name (e.g., "azure", "simulated")
    fn name(&self) -> &str;

    /// Create a managed disk and return its handle
    async fn create_disk(
        &self,
        resource_group: &str,
        name: &str,
        size_gb: u32,
        sku: &str,
        location: &str,
    ) -> Result<DiskHandle>;

    /// Attach a disk to a VM at the given LUN
    async fn attach_disk(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &DiskHandle,
        lun: u32,
    ) -> Result<()>;

    /// Grow a disk to `new_size_gb`
    async fn resize_disk(&self, resource_group: &str, name: &str, new_size_gb: u32) -> Result<()>;

    /// Detach a disk from a VM
    async fn detach_disk(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &DiskHandle,
    ) -> Result<()>;

    /// Delete a disk
    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()>;

    /// Read the current state of a disk. Missing disks are `CloudError::NotFound`.
    async fn get_disk_state(&self, resource_group: &str, name: &str) -> Result<DiskState>;
}

/// Disk operations, used for call accounting and failure injection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskOperation {
    Create,
    Attach,
    Resize,
    Detach,
    Delete,
    Get,
}

impl DiskOperation {
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "create" => Some(Self::Create),
            "attach" => Some(Self::Attach),
            "resize" => Some(Self::Resize),
            "detach" => Some(Self::Detach),
            "delete" => Some(Self::Delete),
            "get" => Some(Self::Get),
            _ => None,
        }
    }
}

impl std::fmt::Display for DiskOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskOperation::Create => write!(f, "create"),
            DiskOperation::Attach => write!(f, "attach"),
            DiskOperation::Resize => write!(f, "resize"),
            DiskOperation::Detach => write!(f, "detach"),
            DiskOperation::Delete => write!(f, "delete"),
            DiskOperation::Get => write!(f, "get"),
        }
    }
}

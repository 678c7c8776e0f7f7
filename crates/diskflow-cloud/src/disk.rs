//! Disk resource types reported by a cloud provider

use serde::{Deserialize, Serialize};

/// Provider-side reference to a managed disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskHandle {
    /// Provider resource ID
    pub id: String,

    /// Disk name within its resource group
    pub name: String,
}

impl DiskHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Provisioning state of a resource as reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    /// Resource is being created
    Creating,
    /// Resource is being updated (resize, attach, detach)
    Updating,
    /// Last operation finished successfully
    Succeeded,
    /// Last operation failed
    Failed,
    /// Resource is being deleted
    Deleting,
    /// State string not recognised
    Unknown,
}

impl ProvisioningState {
    /// Parse the provider's state string (case-insensitive)
    pub fn from_provider(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "creating" => Self::Creating,
            "updating" => Self::Updating,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "deleting" => Self::Deleting,
            _ => Self::Unknown,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl std::fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProvisioningState::Creating => write!(f, "creating"),
            ProvisioningState::Updating => write!(f, "updating"),
            ProvisioningState::Succeeded => write!(f, "succeeded"),
            ProvisioningState::Failed => write!(f, "failed"),
            ProvisioningState::Deleting => write!(f, "deleting"),
            ProvisioningState::Unknown => write!(f, "unknown"),
        }
    }
}

/// Observed state of a single disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskState {
    pub handle: DiskHandle,

    pub provisioning_state: ProvisioningState,

    pub size_gb: u32,

    /// Name of the VM the disk is attached to, if any
    pub attached_to: Option<String>,

    pub sku: Option<String>,

    pub location: Option<String>,
}

impl DiskState {
    pub fn is_attached_to(&self, vm_name: &str) -> bool {
        self.attached_to
            .as_deref()
            .is_some_and(|vm| vm.eq_ignore_ascii_case(vm_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provisioning_state_parse() {
        assert_eq!(
            ProvisioningState::from_provider("Succeeded"),
            ProvisioningState::Succeeded
        );
        assert_eq!(
            ProvisioningState::from_provider("Updating"),
            ProvisioningState::Updating
        );
        assert_eq!(
            ProvisioningState::from_provider("Migrating"),
            ProvisioningState::Unknown
        );
        assert!(ProvisioningState::Failed.is_terminal());
        assert!(!ProvisioningState::Creating.is_terminal());
    }

    #[test]
    fn test_attached_to_ignores_case() {
        let state = DiskState {
            handle: DiskHandle::new("/subscriptions/x/disks/data01", "data01"),
            provisioning_state: ProvisioningState::Succeeded,
            size_gb: 64,
            attached_to: Some("MyVM".to_string()),
            sku: None,
            location: None,
        };
        assert!(state.is_attached_to("myvm"));
        assert!(!state.is_attached_to("other"));
    }
}

//! Azure provider implementation

use crate::az::{Az, AzDisk, CreateDiskConfig};
use async_trait::async_trait;
use diskflow_cloud::{
    CloudError, DiskClient, DiskHandle, DiskState, ProvisioningState, Result,
};
use std::time::Duration;

/// Azure managed-disk client backed by the az CLI
pub struct AzureCliClient {
    az: Az,
}

impl AzureCliClient {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            az: Az::new(program),
        }
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.az = self.az.with_subscription(subscription);
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.az = self.az.with_command_timeout(timeout);
        self
    }

    /// Account name and ID if the az session is usable
    pub async fn check_auth(&self) -> Result<String> {
        let account = self.az.check_auth().await?;
        Ok(format!("{} ({})", account.name, account.id))
    }
}

impl From<AzDisk> for DiskState {
    fn from(disk: AzDisk) -> Self {
        let attached_to = disk.attached_vm();
        Self {
            handle: DiskHandle::new(disk.id, disk.name),
            provisioning_state: disk
                .provisioning_state
                .as_deref()
                .map(ProvisioningState::from_provider)
                .unwrap_or(ProvisioningState::Unknown),
            size_gb: disk.disk_size_gb.unwrap_or(0),
            attached_to,
            sku: disk.sku.map(|s| s.name),
            location: disk.location,
        }
    }
}

#[async_trait]
impl DiskClient for AzureCliClient {
    fn name(&self) -> &str {
        "azure"
    }

    async fn create_disk(
        &self,
        resource_group: &str,
        name: &str,
        size_gb: u32,
        sku: &str,
        location: &str,
    ) -> Result<DiskHandle> {
        tracing::info!("Creating disk {} ({} GB, {})", name, size_gb, sku);

        let config = CreateDiskConfig {
            resource_group: resource_group.to_string(),
            name: name.to_string(),
            size_gb,
            sku: sku.to_string(),
            location: location.to_string(),
        };
        let disk = self.az.create_disk(&config).await?;
        Ok(DiskHandle::new(disk.id, disk.name))
    }

    async fn attach_disk(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &DiskHandle,
        lun: u32,
    ) -> Result<()> {
        tracing::info!("Attaching disk {} to {} at LUN {}", disk.name, vm_name, lun);
        self.az
            .attach_disk(resource_group, vm_name, &disk.id, lun)
            .await?;
        Ok(())
    }

    async fn resize_disk(&self, resource_group: &str, name: &str, new_size_gb: u32) -> Result<()> {
        tracing::info!("Resizing disk {} to {} GB", name, new_size_gb);
        self.az
            .update_disk_size(resource_group, name, new_size_gb)
            .await?;
        Ok(())
    }

    async fn detach_disk(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &DiskHandle,
    ) -> Result<()> {
        tracing::info!("Detaching disk {} from {}", disk.name, vm_name);
        self.az
            .detach_disk(resource_group, vm_name, &disk.name)
            .await?;
        Ok(())
    }

    async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        tracing::info!("Deleting disk {}", name);
        self.az.delete_disk(resource_group, name).await?;
        Ok(())
    }

    async fn get_disk_state(&self, resource_group: &str, name: &str) -> Result<DiskState> {
        let disk = self
            .az
            .show_disk(resource_group, name)
            .await
            .map_err(CloudError::from)?;
        Ok(disk.into())
    }
}

//! az CLI wrapper
//!
//! Wraps the az CLI commands for managed disk operations.

use crate::error::{AzureError, Result};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// az CLI wrapper
pub struct Az {
    program: String,
    subscription: Option<String>,
    command_timeout: Duration,
}

impl Az {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subscription: None,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Check that az is installed and logged in
    pub async fn check_auth(&self) -> Result<AzAccount> {
        let output = self.run_command(&["account", "show"]).await?;
        let account: AzAccount = serde_json::from_str(&output)?;
        Ok(account)
    }

    /// Run an az command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        cmd.args(["--output", "json", "--only-show-errors"]);
        if let Some(ref subscription) = self.subscription {
            cmd.arg("--subscription").arg(subscription);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        tracing::debug!("Running: {} {}", self.program, args.join(" "));

        let output = match tokio::time::timeout(self.command_timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AzureError::AzNotFound);
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(AzureError::CommandTimeout(self.command_timeout.as_secs())),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AzureError::CommandFailed(stderr.to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Create a managed disk
    pub async fn create_disk(&self, config: &CreateDiskConfig) -> Result<AzDisk> {
        let size = config.size_gb.to_string();
        let output = self
            .run_command(&[
                "disk",
                "create",
                "--resource-group",
                config.resource_group.as_str(),
                "--name",
                config.name.as_str(),
                "--size-gb",
                size.as_str(),
                "--sku",
                config.sku.as_str(),
                "--location",
                config.location.as_str(),
            ])
            .await?;

        let disk: AzDisk = serde_json::from_str(&output)?;
        Ok(disk)
    }

    /// Show a managed disk
    pub async fn show_disk(&self, resource_group: &str, name: &str) -> Result<AzDisk> {
        let output = self
            .run_command(&["disk", "show", "--resource-group", resource_group, "--name", name])
            .await?;

        let disk: AzDisk = serde_json::from_str(&output)?;
        Ok(disk)
    }

    /// Grow a managed disk
    pub async fn update_disk_size(
        &self,
        resource_group: &str,
        name: &str,
        size_gb: u32,
    ) -> Result<()> {
        let size = size_gb.to_string();
        self.run_command(&[
            "disk",
            "update",
            "--resource-group",
            resource_group,
            "--name",
            name,
            "--size-gb",
            size.as_str(),
        ])
        .await?;
        Ok(())
    }

    /// Delete a managed disk
    pub async fn delete_disk(&self, resource_group: &str, name: &str) -> Result<()> {
        self.run_command(&[
            "disk",
            "delete",
            "--resource-group",
            resource_group,
            "--name",
            name,
            "--yes",
        ])
        .await?;
        Ok(())
    }

    /// Attach a managed disk to a VM (`disk` accepts a name or resource ID)
    pub async fn attach_disk(
        &self,
        resource_group: &str,
        vm_name: &str,
        disk: &str,
        lun: u32,
    ) -> Result<()> {
        let lun = lun.to_string();
        self.run_command(&[
            "vm",
            "disk",
            "attach",
            "--resource-group",
            resource_group,
            "--vm-name",
            vm_name,
            "--name",
            disk,
            "--lun",
            lun.as_str(),
        ])
        .await?;
        Ok(())
    }

    /// Detach a data disk from a VM
    pub async fn detach_disk(&self, resource_group: &str, vm_name: &str, name: &str) -> Result<()> {
        self.run_command(&[
            "vm",
            "disk",
            "detach",
            "--resource-group",
            resource_group,
            "--vm-name",
            vm_name,
            "--name",
            name,
        ])
        .await?;
        Ok(())
    }
}

/// Account from `az account show`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzAccount {
    pub id: String,
    pub name: String,
}

/// Managed disk as returned by `az disk show`/`az disk create`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AzDisk {
    pub id: String,

    pub name: String,

    pub disk_size_gb: Option<u32>,

    pub provisioning_state: Option<String>,

    /// Resource ID of the VM the disk is attached to
    pub managed_by: Option<String>,

    pub location: Option<String>,

    pub sku: Option<AzSku>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzSku {
    pub name: String,
}

impl AzDisk {
    /// VM name taken from the last segment of `managedBy`
    pub fn attached_vm(&self) -> Option<String> {
        self.managed_by
            .as_deref()
            .filter(|id| !id.is_empty())
            .and_then(|id| id.rsplit('/').next())
            .map(str::to_string)
    }
}

/// Configuration for creating a disk
#[derive(Debug, Clone)]
pub struct CreateDiskConfig {
    pub resource_group: String,
    pub name: String,
    pub size_gb: u32,
    pub sku: String,
    pub location: String,
}

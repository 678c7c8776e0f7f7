//! Azure provider for DiskFlow
//!
//! This crate implements the DiskClient trait for Azure managed disks,
//! enabling DiskFlow to drive the create/attach/resize/detach/delete
//! lifecycle on Azure.
//!
//! # Requirements
//!
//! - `az` CLI must be installed and logged in (`az login`)
//! - Authentication is managed through the az CLI session
//!
//! # Example
//!
//! ```ignore
//! use diskflow_cloud::DiskClient;
//! use diskflow_cloud_azure::AzureCliClient;
//!
//! let client = AzureCliClient::new("az");
//! let handle = client
//!     .create_disk("rg-demo", "data01", 32, "Standard_LRS", "eastus")
//!     .await?;
//! client.attach_disk("rg-demo", "vm01", &handle, 0).await?;
//! ```

pub mod az;
pub mod error;
pub mod provider;

pub use az::{Az, AzDisk, CreateDiskConfig};
pub use error::{AzureError, Result, classify_stderr};
pub use provider::AzureCliClient;

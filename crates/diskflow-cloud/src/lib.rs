//! DiskFlow Cloud Abstraction
//!
//! This crate defines the cloud resource client consumed by the DiskFlow
//! workflow engine, together with the error taxonomy used to decide whether a
//! failed request is worth retrying.
//!
//! # Providers
//!
//! - **Azure**: managed disks via the `az` CLI (`diskflow-cloud-azure`)
//! - **Simulated**: in-memory, deterministic ([`SimulatedDiskClient`])
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  DiskFlow CLI                    │
//! │            (diskflow run/resume/status)          │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                diskflow-core                     │
//! │   Workflow Engine → Step Executor → State Store  │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │               diskflow-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │          trait DiskClient { ... }         │   │
//! │  └──────────────────────────────────────────┘   │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │  azure (az)   │ │   simulated   │
//! └───────────────┘ └───────────────┘
//! ```

pub mod client;
pub mod disk;
pub mod error;
pub mod retry;
pub mod simulated;

// Re-exports
pub use client::{DiskClient, DiskOperation};
pub use disk::{DiskHandle, DiskState, ProvisioningState};
pub use error::{CloudError, ErrorClass, Result};
pub use retry::{PollConfig, RetryConfig};
pub use simulated::SimulatedDiskClient;

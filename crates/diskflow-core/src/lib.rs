//! DiskFlow Core
//!
//! Resumable execution of the managed-disk lifecycle:
//! create → attach → resize → detach → delete.
//!
//! - [`WorkflowEngine`]: drives a run step by step and persists every transition
//! - [`StepExecutor`]: one step, with retry on transient errors and polling
//! - [`StateStore`]: durable run records ([`FileStateStore`])
//!
//! Step failures do not surface as errors. They are recorded on the run, whose
//! [`RunStatus`] tells the caller how it ended.

pub mod engine;
pub mod error;
pub mod executor;
pub mod model;
pub mod store;

pub use engine::{AbortSignal, WorkflowEngine};
pub use error::{Result, StoreError, WorkflowError};
pub use executor::{Outcome, StepExecutor};
pub use model::{
    RUN_FORMAT_VERSION, RunStatus, StepError, StepKind, StepRecord, StepStatus, WorkflowParams,
    WorkflowRun,
};
pub use store::{FileStateStore, RunListing, RunLock, StateStore};

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// State store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Workflow run not found: {0}")]
    NotFound(Uuid),

    #[error("Workflow run {id} is locked by {holder} (since {since})")]
    Locked {
        id: Uuid,
        holder: String,
        since: DateTime<Utc>,
    },

    #[error("Run record version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Workflow engine errors
///
/// Step failures are not errors here: they are recorded on the run and
/// reported through its status.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("State store error: {0}")]
    StateStore(#[from] StoreError),

    #[error("Invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Invalid workflow because no run with this id exists
    #[error("Unknown workflow run: {0}")]
    UnknownRun(Uuid),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
}

impl WorkflowError {
    pub fn is_invalid_workflow(&self) -> bool {
        matches!(
            self,
            WorkflowError::InvalidWorkflow(_) | WorkflowError::UnknownRun(_)
        )
    }

    /// The run is held by another live process
    pub fn is_locked(&self) -> bool {
        matches!(self, WorkflowError::StateStore(StoreError::Locked { .. }))
    }
}

pub type Result<T> = std::result::Result<T, WorkflowError>;

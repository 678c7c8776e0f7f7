//! Workflow run data model

use crate::error::{Result, WorkflowError};
use chrono::{DateTime, Utc};
use diskflow_cloud::{CloudError, ErrorClass};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted record format version
pub const RUN_FORMAT_VERSION: u32 = 1;

/// One operation of the disk lifecycle, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Create,
    Attach,
    Resize,
    Detach,
    Delete,
}

impl StepKind {
    /// Declared step order of every workflow run
    pub const ALL: [StepKind; 5] = [
        StepKind::Create,
        StepKind::Attach,
        StepKind::Resize,
        StepKind::Detach,
        StepKind::Delete,
    ];
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepKind::Create => write!(f, "create"),
            StepKind::Attach => write!(f, "attach"),
            StepKind::Resize => write!(f, "resize"),
            StepKind::Detach => write!(f, "detach"),
            StepKind::Delete => write!(f, "delete"),
        }
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        StepKind::ALL
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!(
                    "unknown step '{}' (expected one of: create, attach, resize, detach, delete)",
                    s
                )
            })
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::NotStarted => write!(f, "not started"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Succeeded => write!(f, "succeeded"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Overall status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Created and persisted, no step started yet
    Pending,
    Running,
    /// Every step succeeded
    Completed,
    /// A step failed; resumable
    Failed,
    /// Stopped between steps on request; resumable
    Aborted,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Pending => write!(f, "pending"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Aborted => write!(f, "aborted"),
        }
    }
}

/// Error recorded on a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepError {
    /// Short error kind (e.g., "throttled", "conflict")
    pub kind: String,

    pub class: ErrorClass,

    pub message: String,
}

impl From<&CloudError> for StepError {
    fn from(err: &CloudError) -> Self {
        Self {
            kind: err.kind().to_string(),
            class: err.class(),
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for StepError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}] {}", self.class, self.kind, self.message)
    }
}

/// One lifecycle operation within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    pub kind: StepKind,

    pub status: StepStatus,

    /// Triggering calls made in the current execution of the step
    pub attempt_count: u32,

    pub last_error: Option<StepError>,

    pub started_at: Option<DateTime<Utc>>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl StepRecord {
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            status: StepStatus::NotStarted,
            attempt_count: 0,
            last_error: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn record_error(&mut self, err: &CloudError) {
        self.last_error = Some(err.into());
    }

    pub(crate) fn begin(&mut self) {
        self.status = StepStatus::Running;
        self.started_at = Some(Utc::now());
        self.finished_at = None;
    }

    pub(crate) fn finish(&mut self, status: StepStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Forget a previous execution so the step runs from scratch
    pub(crate) fn reset(&mut self) {
        *self = Self::new(self.kind);
    }
}

/// Immutable parameters of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowParams {
    pub resource_group: String,

    pub vm_name: String,

    pub disk_name: String,

    pub initial_size_gb: u32,

    pub target_size_gb: u32,

    pub sku: String,

    pub location: String,

    /// Attachment slot on the VM
    pub lun: u32,
}

impl WorkflowParams {
    pub fn new(
        resource_group: impl Into<String>,
        vm_name: impl Into<String>,
        disk_name: impl Into<String>,
        initial_size_gb: u32,
        target_size_gb: u32,
    ) -> Self {
        Self {
            resource_group: resource_group.into(),
            vm_name: vm_name.into(),
            disk_name: disk_name.into(),
            initial_size_gb,
            target_size_gb,
            sku: "Standard_LRS".to_string(),
            location: "eastus".to_string(),
            lun: 0,
        }
    }

    pub fn with_sku(mut self, sku: impl Into<String>) -> Self {
        self.sku = sku.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_lun(mut self, lun: u32) -> Self {
        self.lun = lun;
        self
    }

    /// Sizes are left to the provider to judge.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("resource group", &self.resource_group),
            ("VM name", &self.vm_name),
            ("disk name", &self.disk_name),
            ("sku", &self.sku),
            ("location", &self.location),
        ];
        for (label, value) in fields {
            if value.trim().is_empty() {
                return Err(WorkflowError::InvalidParams(format!(
                    "{} must not be empty",
                    label
                )));
            }
        }
        Ok(())
    }
}

/// One execution of the five-step lifecycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub version: u32,

    pub id: Uuid,

    pub params: WorkflowParams,

    pub steps: Vec<StepRecord>,

    pub status: RunStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl WorkflowRun {
    pub fn new(params: WorkflowParams) -> Self {
        let now = Utc::now();
        Self {
            version: RUN_FORMAT_VERSION,
            id: Uuid::new_v4(),
            params,
            steps: StepKind::ALL.into_iter().map(StepRecord::new).collect(),
            status: RunStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn step(&self, kind: StepKind) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    pub fn step_mut(&mut self, kind: StepKind) -> Option<&mut StepRecord> {
        self.steps.iter_mut().find(|s| s.kind == kind)
    }

    /// First step that has not succeeded yet
    pub fn next_step(&self) -> Option<StepKind> {
        self.steps
            .iter()
            .find(|s| s.status != StepStatus::Succeeded)
            .map(|s| s.kind)
    }

    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Verify that the persisted steps respect the declared order
    ///
    /// A step may only have left `NotStarted` if every step before it has
    /// succeeded, and at most one step may be running.
    pub fn check_ordering(&self) -> std::result::Result<(), String> {
        let kinds: Vec<StepKind> = self.steps.iter().map(|s| s.kind).collect();
        if kinds != StepKind::ALL {
            return Err(format!("unexpected step list {:?}", kinds));
        }

        let running = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Running)
            .count();
        if running > 1 {
            return Err(format!("{} steps are marked running", running));
        }

        let mut predecessors_done = true;
        for step in &self.steps {
            if step.status != StepStatus::NotStarted && !predecessors_done {
                return Err(format!(
                    "step {} is {} although an earlier step has not succeeded",
                    step.kind, step.status
                ));
            }
            predecessors_done &= step.status == StepStatus::Succeeded;
        }

        if self.status == RunStatus::Completed && !predecessors_done {
            return Err("run is completed but not every step succeeded".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> WorkflowParams {
        WorkflowParams::new("rg-demo", "vm01", "data01", 32, 64)
    }

    #[test]
    fn test_new_run_has_five_pending_steps() {
        let run = WorkflowRun::new(params());
        assert_eq!(run.status, RunStatus::Pending);
        assert_eq!(run.steps.len(), 5);
        assert!(run.steps.iter().all(|s| s.status == StepStatus::NotStarted));
        assert_eq!(run.next_step(), Some(StepKind::Create));
        assert!(run.check_ordering().is_ok());
    }

    #[test]
    fn test_step_kind_parse() {
        assert_eq!("Resize".parse::<StepKind>(), Ok(StepKind::Resize));
        assert!("format".parse::<StepKind>().is_err());
    }

    #[test]
    fn test_ordering_rejects_step_after_unfinished_predecessor() {
        let mut run = WorkflowRun::new(params());
        run.step_mut(StepKind::Create).unwrap().status = StepStatus::Succeeded;
        run.step_mut(StepKind::Resize).unwrap().status = StepStatus::Failed;

        let err = run.check_ordering().unwrap_err();
        assert!(err.contains("resize"));
    }

    #[test]
    fn test_ordering_rejects_two_running_steps() {
        let mut run = WorkflowRun::new(params());
        run.step_mut(StepKind::Create).unwrap().status = StepStatus::Running;
        run.step_mut(StepKind::Attach).unwrap().status = StepStatus::Running;
        assert!(run.check_ordering().is_err());
    }

    #[test]
    fn test_ordering_rejects_completed_with_open_steps() {
        let mut run = WorkflowRun::new(params());
        run.status = RunStatus::Completed;
        assert!(run.check_ordering().is_err());
    }

    #[test]
    fn test_validate_rejects_blank_names() {
        let err = WorkflowParams::new("rg", " ", "data01", 32, 64)
            .validate()
            .unwrap_err();
        assert!(err.to_string().contains("VM name"));
    }

    #[test]
    fn test_reset_clears_attempts() {
        let mut step = StepRecord::new(StepKind::Attach);
        step.begin();
        step.attempt_count = 4;
        step.record_error(&CloudError::Throttled("429".into()));
        step.finish(StepStatus::Failed);

        step.reset();
        assert_eq!(step, StepRecord::new(StepKind::Attach));
    }
}

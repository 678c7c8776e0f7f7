//! Workflow engine
//!
//! Drives a run through its steps in order, persisting the run after every
//! transition so that a process can die at any point and the run can be
//! resumed from the record.

use crate::error::{Result, StoreError, WorkflowError};
use crate::executor::{Outcome, StepExecutor};
use crate::model::{RunStatus, StepKind, StepStatus, WorkflowParams, WorkflowRun};
use crate::store::StateStore;
use diskflow_cloud::DiskClient;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use uuid::Uuid;

/// Cooperative stop request, honoured between steps
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

pub struct WorkflowEngine {
    client: Arc<dyn DiskClient>,
    store: Arc<dyn StateStore>,
    executor: StepExecutor,
    abort: AbortSignal,
}

impl WorkflowEngine {
    pub fn new(client: Arc<dyn DiskClient>, store: Arc<dyn StateStore>) -> Self {
        Self {
            client,
            store,
            executor: StepExecutor::default(),
            abort: AbortSignal::new(),
        }
    }

    pub fn with_executor(mut self, executor: StepExecutor) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_abort_signal(mut self, signal: AbortSignal) -> Self {
        self.abort = signal;
        self
    }

    /// Handle for requesting a stop of the runs driven by this engine
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    /// Start a new run and drive it until it completes, fails or is aborted
    ///
    /// The run is persisted before any provider call, so its id is known even
    /// if the process dies during the first step.
    pub async fn run(&self, params: WorkflowParams) -> Result<WorkflowRun> {
        params.validate()?;

        let mut run = WorkflowRun::new(params);
        self.store.save(&run).await?;
        tracing::info!(
            "Started run {} for disk {} on {}",
            run.id,
            run.params.disk_name,
            run.params.vm_name
        );

        let lock = self.store.acquire_lock(run.id).await?;
        let driven = self.drive(&mut run).await;
        let released = lock.release().await;
        driven?;
        released?;
        Ok(run)
    }

    /// Continue a run from its first step that has not succeeded
    pub async fn resume(&self, id: Uuid) -> Result<WorkflowRun> {
        self.resume_from(id, None).await
    }

    /// Continue a run, asserting which step comes next
    ///
    /// `from` must be the first step that has not succeeded. Anything else is
    /// rejected without touching the run.
    pub async fn resume_from(&self, id: Uuid, from: Option<StepKind>) -> Result<WorkflowRun> {
        let lock = self.store.acquire_lock(id).await?;
        let resumed = self.resume_locked(id, from).await;
        let released = lock.release().await;
        let run = resumed?;
        released?;
        Ok(run)
    }

    /// Mark a run as aborted so it is not picked up again until resumed
    ///
    /// Fails with a lock error while another process is driving the run; that
    /// process has to be stopped through its own abort signal.
    pub async fn abort(&self, id: Uuid) -> Result<WorkflowRun> {
        let lock = self.store.acquire_lock(id).await?;
        let aborted = self.abort_locked(id).await;
        let released = lock.release().await;
        let run = aborted?;
        released?;
        Ok(run)
    }

    async fn resume_locked(&self, id: Uuid, from: Option<StepKind>) -> Result<WorkflowRun> {
        let mut run = self.load(id).await?;
        if run.is_completed() {
            return Err(WorkflowError::InvalidWorkflow(format!(
                "run {} is already completed",
                id
            )));
        }
        run.check_ordering()
            .map_err(|reason| WorkflowError::InvalidWorkflow(format!("run {}: {}", id, reason)))?;

        let next = run.next_step();
        if let Some(from) = from {
            if next != Some(from) {
                let expected = next.map_or_else(|| "none".to_string(), |k| k.to_string());
                return Err(WorkflowError::InvalidWorkflow(format!(
                    "cannot resume run {} from {}: next step is {}",
                    id, from, expected
                )));
            }
        }

        let Some(next) = next else {
            // Every step succeeded before the final status was written
            run.status = RunStatus::Completed;
            run.touch();
            self.store.save(&run).await?;
            return Ok(run);
        };

        if let Some(step) = run.step_mut(next) {
            if step.status != StepStatus::NotStarted {
                tracing::info!("Re-running step {} of run {} (was {})", next, id, step.status);
                step.reset();
            }
        }

        tracing::info!("Resuming run {} at {}", id, next);
        self.drive(&mut run).await?;
        Ok(run)
    }

    async fn abort_locked(&self, id: Uuid) -> Result<WorkflowRun> {
        let mut run = self.load(id).await?;
        if run.is_completed() {
            return Err(WorkflowError::InvalidWorkflow(format!(
                "run {} is already completed",
                id
            )));
        }
        run.status = RunStatus::Aborted;
        run.touch();
        self.store.save(&run).await?;
        tracing::warn!("Run {} aborted", id);
        Ok(run)
    }

    async fn load(&self, id: Uuid) -> Result<WorkflowRun> {
        match self.store.load(id).await {
            Ok(run) => Ok(run),
            Err(StoreError::NotFound(_)) => Err(WorkflowError::UnknownRun(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn drive(&self, run: &mut WorkflowRun) -> Result<()> {
        run.status = RunStatus::Running;
        run.touch();
        self.store.save(run).await?;

        while let Some(index) = run
            .steps
            .iter()
            .position(|s| s.status != StepStatus::Succeeded)
        {
            let kind = run.steps[index].kind;
            if self.abort.is_aborted() {
                run.status = RunStatus::Aborted;
                run.touch();
                self.store.save(run).await?;
                tracing::warn!("Run {} aborted before step {}", run.id, kind);
                return Ok(());
            }

            run.steps[index].begin();
            run.touch();
            self.store.save(run).await?;
            tracing::info!("Run {}: {} started", run.id, kind);

            let params = run.params.clone();
            let step = &mut run.steps[index];
            let outcome = self
                .executor
                .execute(step, &params, self.client.as_ref())
                .await;

            match outcome {
                Outcome::Succeeded => {
                    step.finish(StepStatus::Succeeded);
                    run.touch();
                    self.store.save(run).await?;
                    tracing::info!("Run {}: {} succeeded", run.id, kind);
                }
                Outcome::TransientFailure(err) | Outcome::PermanentFailure(err) => {
                    step.finish(StepStatus::Failed);
                    run.status = RunStatus::Failed;
                    run.touch();
                    self.store.save(run).await?;
                    tracing::error!("Run {}: {} failed: {}", run.id, kind, err);
                    return Ok(());
                }
            }
        }

        run.status = RunStatus::Completed;
        run.touch();
        self.store.save(run).await?;
        tracing::info!("Run {} completed", run.id);
        Ok(())
    }
}

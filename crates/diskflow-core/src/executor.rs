//! Step executor
//!
//! Runs a single lifecycle step against a [`DiskClient`]: issue the operation,
//! re-issue it with exponential backoff on transient errors, then poll the disk
//! until the provider reports the change as settled.
//!
//! Every step reconciles with what already exists before acting, so running a
//! step a second time after a crash or a lost response does not fail on its own
//! earlier effect.

use crate::model::{StepKind, StepRecord, WorkflowParams};
use diskflow_cloud::{
    CloudError, DiskClient, DiskState, PollConfig, ProvisioningState, RetryConfig,
};
use tokio::time::{Instant, sleep};

/// Result of executing one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    /// Retries exhausted or the change never settled
    TransientFailure(CloudError),
    PermanentFailure(CloudError),
}

impl Outcome {
    fn from_error(err: CloudError) -> Self {
        if err.is_transient() {
            Outcome::TransientFailure(err)
        } else {
            Outcome::PermanentFailure(err)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Succeeded)
    }

    pub fn error(&self) -> Option<&CloudError> {
        match self {
            Outcome::Succeeded => None,
            Outcome::TransientFailure(err) | Outcome::PermanentFailure(err) => Some(err),
        }
    }
}

/// Progress of a change as seen by one poll
enum Progress {
    Settled,
    Pending,
    Failed(CloudError),
}

/// Executes steps with retry and polling
#[derive(Debug, Clone, Default)]
pub struct StepExecutor {
    retry: RetryConfig,
    poll: PollConfig,
}

impl StepExecutor {
    pub fn new(retry: RetryConfig, poll: PollConfig) -> Self {
        Self { retry, poll }
    }

    /// Execute `step`, updating its attempt count and last error
    ///
    /// The record's status is left to the caller.
    pub async fn execute(
        &self,
        step: &mut StepRecord,
        params: &WorkflowParams,
        client: &dyn DiskClient,
    ) -> Outcome {
        let kind = step.kind;
        let mut retries = 0;

        loop {
            step.attempt_count += 1;
            match self.trigger(kind, params, client).await {
                Ok(()) => break,
                Err(err) if err.is_transient() && retries < self.retry.max_retries => {
                    let delay = self.retry.delay_for_attempt(retries);
                    tracing::warn!(
                        "{} of disk {} failed (attempt {}): {}. Retrying in {:?}",
                        kind,
                        params.disk_name,
                        step.attempt_count,
                        err,
                        delay
                    );
                    step.record_error(&err);
                    retries += 1;
                    sleep(delay).await;
                }
                Err(err) => {
                    tracing::error!("{} of disk {} failed: {}", kind, params.disk_name, err);
                    step.record_error(&err);
                    return Outcome::from_error(err);
                }
            }
        }

        match self.wait_until_settled(kind, params, client).await {
            Ok(()) => {
                step.last_error = None;
                tracing::info!("{} of disk {} settled", kind, params.disk_name);
                Outcome::Succeeded
            }
            Err(err) => {
                tracing::error!("{} of disk {} did not settle: {}", kind, params.disk_name, err);
                step.record_error(&err);
                Outcome::from_error(err)
            }
        }
    }

    /// Issue the provider call for `kind`, skipping it if its effect is already present
    async fn trigger(
        &self,
        kind: StepKind,
        params: &WorkflowParams,
        client: &dyn DiskClient,
    ) -> Result<(), CloudError> {
        let rg = params.resource_group.as_str();
        let disk = params.disk_name.as_str();

        match kind {
            StepKind::Create => {
                let created = client
                    .create_disk(rg, disk, params.initial_size_gb, &params.sku, &params.location)
                    .await;
                match created {
                    Ok(_) => Ok(()),
                    Err(CloudError::Conflict(reason)) => {
                        let existing = match client.get_disk_state(rg, disk).await {
                            Ok(state) => state,
                            Err(e) if e.is_not_found() => {
                                return Err(CloudError::Conflict(reason));
                            }
                            Err(e) => return Err(e),
                        };
                        if matches_requested(&existing, params) {
                            tracing::info!("Disk {} already exists as requested", disk);
                            Ok(())
                        } else {
                            Err(CloudError::Conflict(format!(
                                "disk '{}' already exists with different properties ({} GB, sku {})",
                                disk,
                                existing.size_gb,
                                existing.sku.as_deref().unwrap_or("unknown")
                            )))
                        }
                    }
                    Err(e) => Err(e),
                }
            }
            StepKind::Attach => {
                let state = client.get_disk_state(rg, disk).await?;
                match state.attached_to.as_deref() {
                    Some(vm) if vm.eq_ignore_ascii_case(&params.vm_name) => {
                        tracing::info!("Disk {} is already attached to {}", disk, vm);
                        Ok(())
                    }
                    Some(vm) => Err(CloudError::Conflict(format!(
                        "disk '{}' is attached to another VM '{}'",
                        disk, vm
                    ))),
                    None => {
                        client
                            .attach_disk(rg, &params.vm_name, &state.handle, params.lun)
                            .await
                    }
                }
            }
            StepKind::Resize => {
                let state = client.get_disk_state(rg, disk).await?;
                if state.size_gb == params.target_size_gb {
                    tracing::info!("Disk {} is already {} GB", disk, state.size_gb);
                    return Ok(());
                }
                client.resize_disk(rg, disk, params.target_size_gb).await
            }
            StepKind::Detach => {
                let state = client.get_disk_state(rg, disk).await?;
                match state.attached_to.as_deref() {
                    None => {
                        tracing::info!("Disk {} is not attached", disk);
                        Ok(())
                    }
                    Some(vm) if !vm.eq_ignore_ascii_case(&params.vm_name) => {
                        Err(CloudError::Conflict(format!(
                            "disk '{}' is attached to another VM '{}'",
                            disk, vm
                        )))
                    }
                    Some(_) => {
                        client
                            .detach_disk(rg, &params.vm_name, &state.handle)
                            .await
                    }
                }
            }
            StepKind::Delete => match client.delete_disk(rg, disk).await {
                Err(e) if e.is_not_found() => {
                    tracing::info!("Disk {} is already gone", disk);
                    Ok(())
                }
                other => other,
            },
        }
    }

    /// Poll until the change made by `kind` is visible and provisioning is terminal
    ///
    /// Transient read errors count as "not yet". Running out of time yields a
    /// transient timeout; the operation itself is not re-issued.
    async fn wait_until_settled(
        &self,
        kind: StepKind,
        params: &WorkflowParams,
        client: &dyn DiskClient,
    ) -> Result<(), CloudError> {
        let deadline = Instant::now() + self.poll.timeout;
        let mut polls = 0u32;

        loop {
            polls += 1;
            let progress = match client
                .get_disk_state(&params.resource_group, &params.disk_name)
                .await
            {
                Ok(state) => progress_of(kind, params, &state),
                Err(e) if e.is_not_found() => match kind {
                    StepKind::Delete => Progress::Settled,
                    StepKind::Create => Progress::Pending,
                    _ => Progress::Failed(e),
                },
                Err(e) if e.is_transient() => {
                    tracing::debug!("Poll {} for {} failed: {}", polls, kind, e);
                    Progress::Pending
                }
                Err(e) => Progress::Failed(e),
            };

            match progress {
                Progress::Settled => return Ok(()),
                Progress::Failed(e) => return Err(e),
                Progress::Pending => {}
            }

            if Instant::now() >= deadline {
                return Err(CloudError::Timeout(format!(
                    "{} of disk '{}' did not settle within {:?} ({} polls)",
                    kind, params.disk_name, self.poll.timeout, polls
                )));
            }
            sleep(self.poll.interval).await;
        }
    }
}

fn same_name(a: &str, b: &str) -> bool {
    let normalize = |s: &str| s.replace(' ', "").to_ascii_lowercase();
    normalize(a) == normalize(b)
}

/// An existing disk counts as ours if every property we know matches
fn matches_requested(state: &DiskState, params: &WorkflowParams) -> bool {
    state.size_gb == params.initial_size_gb
        && state.sku.as_deref().is_none_or(|sku| same_name(sku, &params.sku))
        && state
            .location
            .as_deref()
            .is_none_or(|location| same_name(location, &params.location))
}

fn progress_of(kind: StepKind, params: &WorkflowParams, state: &DiskState) -> Progress {
    match state.provisioning_state {
        ProvisioningState::Failed => {
            return Progress::Failed(CloudError::ProvisioningFailed(format!(
                "disk '{}' entered the Failed state during {}",
                params.disk_name, kind
            )));
        }
        ProvisioningState::Succeeded => {}
        _ => return Progress::Pending,
    }

    let done = match kind {
        StepKind::Create => true,
        StepKind::Attach => state.is_attached_to(&params.vm_name),
        StepKind::Resize => state.size_gb >= params.target_size_gb,
        StepKind::Detach => state.attached_to.is_none(),
        StepKind::Delete => false,
    };
    if done {
        Progress::Settled
    } else {
        Progress::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diskflow_cloud::{DiskOperation, SimulatedDiskClient};
    use std::time::Duration;

    const RG: &str = "rg-test";

    fn executor() -> StepExecutor {
        StepExecutor::new(
            RetryConfig::immediate(3),
            PollConfig {
                interval: Duration::from_millis(1),
                timeout: Duration::from_secs(2),
            },
        )
    }

    fn params() -> WorkflowParams {
        WorkflowParams::new(RG, "vm01", "data01", 32, 64)
    }

    async fn run_step(
        kind: StepKind,
        client: &SimulatedDiskClient,
        executor: &StepExecutor,
    ) -> (StepRecord, Outcome) {
        let mut step = StepRecord::new(kind);
        let outcome = executor.execute(&mut step, &params(), client).await;
        (step, outcome)
    }

    #[tokio::test]
    async fn test_create_polls_until_settled() {
        let client = SimulatedDiskClient::new().with_settle_polls(3);
        let (step, outcome) = run_step(StepKind::Create, &client, &executor()).await;

        assert_eq!(outcome, Outcome::Succeeded);
        assert_eq!(step.attempt_count, 1);
        assert_eq!(client.call_count(DiskOperation::Get), 4);
        let disk = client.disk(RG, "data01").unwrap();
        assert_eq!(disk.provisioning_state, ProvisioningState::Succeeded);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let client = SimulatedDiskClient::new();
        client.fail_times(
            DiskOperation::Create,
            CloudError::ServiceUnavailable("503".into()),
            2,
        );

        let (step, outcome) = run_step(StepKind::Create, &client, &executor()).await;
        assert!(outcome.is_success());
        assert_eq!(step.attempt_count, 3);
        assert_eq!(step.last_error, None);
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_transient_failure() {
        let client = SimulatedDiskClient::new();
        client.fail_always(DiskOperation::Create, CloudError::Throttled("429".into()));

        let (step, outcome) = run_step(StepKind::Create, &client, &executor()).await;
        assert!(matches!(outcome, Outcome::TransientFailure(CloudError::Throttled(_))));
        assert_eq!(step.attempt_count, 4);
        assert_eq!(client.call_count(DiskOperation::Create), 4);
        assert_eq!(step.last_error.unwrap().kind, "throttled");
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let client = SimulatedDiskClient::new();
        client.fail_next(
            DiskOperation::Create,
            CloudError::QuotaExceeded("disk quota".into()),
        );

        let (step, outcome) = run_step(StepKind::Create, &client, &executor()).await;
        assert!(matches!(outcome, Outcome::PermanentFailure(CloudError::QuotaExceeded(_))));
        assert_eq!(step.attempt_count, 1);
        assert_eq!(client.call_count(DiskOperation::Create), 1);
    }

    #[tokio::test]
    async fn test_lost_create_response_is_reconciled() {
        let client = SimulatedDiskClient::new();
        client.fail_after_apply(DiskOperation::Create, CloudError::Timeout("lost".into()));

        let (step, outcome) = run_step(StepKind::Create, &client, &executor()).await;
        assert!(outcome.is_success());
        assert_eq!(step.attempt_count, 2);
        assert_eq!(client.disk_count(), 1);
    }

    #[tokio::test]
    async fn test_create_conflict_with_foreign_disk() {
        let client = SimulatedDiskClient::new();
        client.insert_disk(RG, "data01", 512, "Premium_LRS");

        let (_, outcome) = run_step(StepKind::Create, &client, &executor()).await;
        assert!(matches!(outcome, Outcome::PermanentFailure(CloudError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_attach_skips_when_already_attached() {
        let client = SimulatedDiskClient::new();
        client.insert_disk(RG, "data01", 32, "Standard_LRS");
        let handle = client.disk(RG, "data01").unwrap().handle;
        client.attach_disk(RG, "vm01", &handle, 0).await.unwrap();

        let (_, outcome) = run_step(StepKind::Attach, &client, &executor()).await;
        assert!(outcome.is_success());
        assert_eq!(client.call_count(DiskOperation::Attach), 1);
    }

    #[tokio::test]
    async fn test_attach_occupied_lun_is_permanent() {
        let client = SimulatedDiskClient::new();
        client.insert_disk(RG, "data01", 32, "Standard_LRS");
        client.occupy_lun(RG, "vm01", 0);

        let (step, outcome) = run_step(StepKind::Attach, &client, &executor()).await;
        assert!(matches!(outcome, Outcome::PermanentFailure(CloudError::Conflict(_))));
        assert_eq!(step.last_error.unwrap().kind, "conflict");
    }

    #[tokio::test]
    async fn test_resize_skips_when_already_at_target() {
        let client = SimulatedDiskClient::new();
        client.insert_disk(RG, "data01", 64, "Standard_LRS");

        let (_, outcome) = run_step(StepKind::Resize, &client, &executor()).await;
        assert!(outcome.is_success());
        assert_eq!(client.call_count(DiskOperation::Resize), 0);
    }

    #[tokio::test]
    async fn test_detach_and_delete_are_idempotent() {
        let client = SimulatedDiskClient::new();
        client.insert_disk(RG, "data01", 64, "Standard_LRS");

        let (_, detached) = run_step(StepKind::Detach, &client, &executor()).await;
        assert!(detached.is_success());
        assert_eq!(client.call_count(DiskOperation::Detach), 0);

        let (_, deleted) = run_step(StepKind::Delete, &client, &executor()).await;
        let (_, deleted_again) = run_step(StepKind::Delete, &client, &executor()).await;
        assert!(deleted.is_success());
        assert!(deleted_again.is_success());
        assert_eq!(client.disk_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_provisioning_is_permanent() {
        let client = SimulatedDiskClient::new().with_settle_polls(1);
        client.fail_provisioning(DiskOperation::Create);

        let (step, outcome) = run_step(StepKind::Create, &client, &executor()).await;
        assert!(matches!(
            outcome,
            Outcome::PermanentFailure(CloudError::ProvisioningFailed(_))
        ));
        assert_eq!(step.last_error.unwrap().kind, "provisioning_failed");
    }

    #[tokio::test]
    async fn test_poll_timeout_does_not_retrigger() {
        let client = SimulatedDiskClient::new().with_settle_polls(u32::MAX);
        let executor = StepExecutor::new(
            RetryConfig::immediate(3),
            PollConfig {
                interval: Duration::from_millis(1),
                timeout: Duration::from_millis(20),
            },
        );

        let (step, outcome) = run_step(StepKind::Create, &client, &executor).await;
        assert!(matches!(outcome, Outcome::TransientFailure(CloudError::Timeout(_))));
        assert_eq!(step.attempt_count, 1);
        assert_eq!(client.call_count(DiskOperation::Create), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_waits_between_retries() {
        let client = SimulatedDiskClient::new();
        client.fail_times(DiskOperation::Create, CloudError::Throttled("429".into()), 3);

        let started = Instant::now();
        let (step, outcome) = run_step(StepKind::Create, &client, &StepExecutor::default()).await;
        assert!(outcome.is_success());
        assert_eq!(step.attempt_count, 4);
        // 2s + 4s + 8s
        assert!(started.elapsed() >= Duration::from_secs(14));
    }
}

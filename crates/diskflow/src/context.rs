use anyhow::Context;
use diskflow_cloud::{CloudError, DiskClient, DiskOperation, SimulatedDiskClient};
use diskflow_cloud_azure::AzureCliClient;
use diskflow_config::{Config, ProviderKind};
use diskflow_core::{AbortSignal, FileStateStore, StepExecutor, WorkflowEngine};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Operation the simulated provider should always fail (e.g. `resize`)
pub const SIMULATE_FAIL_ENV: &str = "DISKFLOW_SIMULATE_FAIL";

/// Simulated disks, kept next to the run records
const SIMULATED_SNAPSHOT: &str = "simulated.json";

/// Loaded configuration and the state store every command works on
pub struct AppContext {
    pub config: Config,
    pub store: Arc<FileStateStore>,
    state_dir: PathBuf,
}

impl AppContext {
    pub fn load(config_path: Option<&Path>, state_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let config = diskflow_config::load(config_path)?;
        let state_dir = match state_dir {
            Some(dir) => dir,
            None => config.state_dir()?,
        };
        tracing::debug!("State directory: {}", state_dir.display());

        Ok(Self {
            config,
            store: Arc::new(FileStateStore::new(&state_dir)),
            state_dir,
        })
    }

    fn azure_client(&self) -> AzureCliClient {
        let mut client = AzureCliClient::new(&self.config.az_path)
            .with_command_timeout(self.config.az_timeout());
        if let Some(subscription) = &self.config.subscription {
            client = client.with_subscription(subscription);
        }
        client
    }

    /// Fail early when the provider cannot be used, before a run is touched
    pub async fn verify_provider(&self) -> anyhow::Result<()> {
        if self.config.provider == ProviderKind::Azure {
            let account = self
                .azure_client()
                .check_auth()
                .await
                .context("az is not usable; install it and run 'az login'")?;
            tracing::info!("Using Azure account {}", account);
        }
        Ok(())
    }

    fn client(&self) -> anyhow::Result<Arc<dyn DiskClient>> {
        match self.config.provider {
            ProviderKind::Azure => Ok(Arc::new(self.azure_client())),
            ProviderKind::Simulated => {
                let client = SimulatedDiskClient::new()
                    .with_snapshot_file(self.state_dir.join(SIMULATED_SNAPSHOT));
                if let Ok(op) = std::env::var(SIMULATE_FAIL_ENV) {
                    let op = DiskOperation::from_name(&op).ok_or_else(|| {
                        anyhow::anyhow!("{} names an unknown operation: {}", SIMULATE_FAIL_ENV, op)
                    })?;
                    client.fail_always(
                        op,
                        CloudError::InvalidParameter(format!("simulated {} failure", op)),
                    );
                }
                Ok(Arc::new(client))
            }
        }
    }

    /// Engine wired to the configured provider, stopping when `abort` is raised
    pub fn engine(&self, abort: AbortSignal) -> anyhow::Result<WorkflowEngine> {
        let client = self.client()?;
        tracing::debug!("Using {} provider", client.name());

        let executor = StepExecutor::new(self.config.retry_config(), self.config.poll_config());
        Ok(WorkflowEngine::new(client, self.store.clone())
            .with_executor(executor)
            .with_abort_signal(abort))
    }
}

/// Raise `signal` on Ctrl-C so the current step can finish cleanly
pub fn abort_on_ctrl_c(signal: AbortSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted: stopping after the current step...");
            tracing::warn!("Abort requested");
            signal.abort();
        }
    });
}

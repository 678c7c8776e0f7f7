//! Durable storage of workflow runs
//!
//! Each run lives in `<root>/runs/<id>.json`. Writes go to a temporary file in
//! the same directory which is then renamed over the record, so a crash leaves
//! either the previous or the new record on disk, never a torn one.

use crate::error::StoreError;
use crate::model::{RUN_FORMAT_VERSION, WorkflowRun};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

const RUNS_DIR: &str = "runs";
/// How often a held lock renews its heartbeat
const LOCK_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
/// A lock whose heartbeat is older than this is abandoned
const LOCK_STALE_AFTER: Duration = Duration::from_secs(120);

pub type Result<T> = std::result::Result<T, StoreError>;

/// Snapshot of every stored run, oldest first
///
/// Iteration never touches storage, so a listing can be walked any number of
/// times.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunListing {
    runs: Vec<WorkflowRun>,
}

impl RunListing {
    pub fn new(mut runs: Vec<WorkflowRun>) -> Self {
        runs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Self { runs }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, WorkflowRun> {
        self.runs.iter()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

impl<'a> IntoIterator for &'a RunListing {
    type Item = &'a WorkflowRun;
    type IntoIter = std::slice::Iter<'a, WorkflowRun>;

    fn into_iter(self) -> Self::IntoIter {
        self.runs.iter()
    }
}

/// Persistence for workflow runs
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Persist the complete run, replacing any previous record with the same id
    async fn save(&self, run: &WorkflowRun) -> Result<()>;

    async fn load(&self, id: Uuid) -> Result<WorkflowRun>;

    async fn list(&self) -> Result<RunListing>;

    /// Take exclusive ownership of a run for driving it
    async fn acquire_lock(&self, id: Uuid) -> Result<RunLock>;
}

/// Lock file content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LockInfo {
    holder: String,
    pid: u32,
    acquired_at: DateTime<Utc>,
    /// Renewed while the holder is alive
    #[serde(default)]
    heartbeat_at: Option<DateTime<Utc>>,
}

impl LockInfo {
    fn current() -> Self {
        let now = Utc::now();
        Self {
            holder: host_name(),
            pid: std::process::id(),
            acquired_at: now,
            heartbeat_at: Some(now),
        }
    }

    fn last_seen(&self) -> DateTime<Utc> {
        self.heartbeat_at.unwrap_or(self.acquired_at)
    }

    fn same_owner(&self, other: &LockInfo) -> bool {
        self.holder == other.holder && self.pid == other.pid && self.acquired_at == other.acquired_at
    }

    /// Abandoned: the heartbeat lapsed, or the holder is a dead process on this host
    fn is_stale(&self, stale_after: Duration) -> bool {
        let lapsed = Utc::now()
            .signed_duration_since(self.last_seen())
            .to_std()
            .is_ok_and(|age| age >= stale_after);
        lapsed || (self.holder == host_name() && !process_alive(self.pid))
    }
}

fn host_name() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("HOST"))
        .ok()
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|name| name.trim().to_string())
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}

/// Write `info` next to `path` and move it into place
async fn write_lock_info(path: &Path, info: &LockInfo) -> std::io::Result<()> {
    let content = serde_json::to_string_pretty(info).map_err(std::io::Error::other)?;
    let temp = path.with_extension(format!("lock.{}.tmp", info.pid));
    let mut file = fs::File::create(&temp).await?;
    file.write_all(content.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&temp, path).await
}

async fn read_lock_info(path: &Path) -> Option<LockInfo> {
    let content = fs::read_to_string(path).await.ok()?;
    serde_json::from_str(&content).ok()
}

/// Renew the heartbeat of `info` until stopped or the lock is no longer ours
async fn heartbeat(
    path: PathBuf,
    mut info: LockInfo,
    interval: Duration,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => return,
            _ = tokio::time::sleep(interval) => {}
        }

        match read_lock_info(&path).await {
            Some(current) if current.same_owner(&info) => {}
            _ => {
                tracing::warn!("Run lock {} was taken over", path.display());
                return;
            }
        }

        info.heartbeat_at = Some(Utc::now());
        if let Err(e) = write_lock_info(&path, &info).await {
            tracing::warn!("Failed to renew run lock {}: {}", path.display(), e);
        }
    }
}

/// RAII guard for a run lock
///
/// A background task keeps the heartbeat fresh until the guard is released
/// or dropped.
#[derive(Debug)]
pub struct RunLock {
    lock_path: PathBuf,
    owner: LockInfo,
    heartbeat: Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl RunLock {
    /// Stop the heartbeat and remove the lock file, unless it was taken over
    pub async fn release(mut self) -> Result<()> {
        if let Some((stop, task)) = self.heartbeat.take() {
            let _ = stop.send(());
            let _ = task.await;
        }
        match read_lock_info(&self.lock_path).await {
            Some(current) if current.same_owner(&self.owner) => {
                fs::remove_file(&self.lock_path).await?;
                tracing::debug!("Released run lock {}", self.lock_path.display());
            }
            Some(_) => tracing::warn!(
                "Run lock {} is held by another process, leaving it",
                self.lock_path.display()
            ),
            None => {}
        }
        Ok(())
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        let Some((stop, task)) = self.heartbeat.take() else {
            return;
        };
        let _ = stop.send(());
        task.abort();

        let still_ours = std::fs::read_to_string(&self.lock_path)
            .ok()
            .and_then(|content| serde_json::from_str::<LockInfo>(&content).ok())
            .is_some_and(|current| current.same_owner(&self.owner));
        if still_ours {
            let _ = std::fs::remove_file(&self.lock_path);
        }
    }
}

/// File-backed state store
#[derive(Debug)]
pub struct FileStateStore {
    root: PathBuf,
    /// Serializes writers of the same run within this process
    writers: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
    heartbeat_interval: Duration,
    stale_after: Duration,
}

impl FileStateStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            writers: Mutex::new(HashMap::new()),
            heartbeat_interval: LOCK_HEARTBEAT_INTERVAL,
            stale_after: LOCK_STALE_AFTER,
        }
    }

    /// Override how often held locks renew and when an unrenewed lock is abandoned
    pub fn with_lock_timing(mut self, heartbeat_interval: Duration, stale_after: Duration) -> Self {
        self.heartbeat_interval = heartbeat_interval;
        self.stale_after = stale_after;
        self
    }

    fn runs_dir(&self) -> PathBuf {
        self.root.join(RUNS_DIR)
    }

    fn run_path(&self, id: Uuid) -> PathBuf {
        self.runs_dir().join(format!("{}.json", id))
    }

    fn temp_path(&self, id: Uuid) -> PathBuf {
        self.runs_dir()
            .join(format!(".{}.{}.tmp", id, std::process::id()))
    }

    fn lock_path(&self, id: Uuid) -> PathBuf {
        self.runs_dir().join(format!("{}.lock", id))
    }

    async fn ensure_runs_dir(&self) -> Result<()> {
        let dir = self.runs_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            tracing::debug!("Created state directory: {}", dir.display());
        }
        Ok(())
    }

    fn writer(&self, id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut writers = self
            .writers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writers.entry(id).or_default().clone()
    }

    async fn read_run(path: &Path) -> Result<WorkflowRun> {
        let content = fs::read_to_string(path).await?;
        let run: WorkflowRun = serde_json::from_str(&content)?;

        if run.version > RUN_FORMAT_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: run.version,
                supported: RUN_FORMAT_VERSION,
            });
        }
        Ok(run)
    }

    /// Create the lock file with its content in one step
    ///
    /// The content is written to a private file first and hard-linked into
    /// place, so no reader ever sees an empty lock.
    async fn try_create_lock(path: &Path, info: &LockInfo) -> std::io::Result<()> {
        let staged = path.with_extension(format!("lock.{}.new", info.pid));
        let content = serde_json::to_string_pretty(info).map_err(std::io::Error::other)?;

        let mut file = fs::File::create(&staged).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        let linked = fs::hard_link(&staged, path).await;
        let _ = fs::remove_file(&staged).await;
        linked
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn save(&self, run: &WorkflowRun) -> Result<()> {
        let writer = self.writer(run.id);
        let _guard = writer.lock().await;

        self.ensure_runs_dir().await?;

        let path = self.run_path(run.id);
        let temp = self.temp_path(run.id);
        let content = serde_json::to_string_pretty(run)?;

        let written = async {
            let mut file = fs::File::create(&temp).await?;
            file.write_all(content.as_bytes()).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&temp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = fs::remove_file(&temp).await;
            return Err(e.into());
        }

        tracing::debug!("Saved run {} ({})", run.id, run.status);
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<WorkflowRun> {
        let path = self.run_path(id);
        match Self::read_run(&path).await {
            Err(StoreError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id))
            }
            other => other,
        }
    }

    async fn list(&self) -> Result<RunListing> {
        let dir = self.runs_dir();
        if !dir.exists() {
            return Ok(RunListing::default());
        }

        let mut runs = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_record = path.extension().is_some_and(|ext| ext == "json")
                && path
                    .file_stem()
                    .and_then(|stem| stem.to_str())
                    .is_some_and(|stem| Uuid::parse_str(stem).is_ok());
            if !is_record {
                continue;
            }

            match Self::read_run(&path).await {
                Ok(run) => runs.push(run),
                Err(e) => tracing::warn!("Skipping unreadable run {}: {}", path.display(), e),
            }
        }

        tracing::debug!("Listed {} runs", runs.len());
        Ok(RunListing::new(runs))
    }

    async fn acquire_lock(&self, id: Uuid) -> Result<RunLock> {
        self.ensure_runs_dir().await?;
        let lock_path = self.lock_path(id);

        for _ in 0..2 {
            let info = LockInfo::current();
            match Self::try_create_lock(&lock_path, &info).await {
                Ok(()) => {
                    tracing::debug!("Acquired run lock for {}", id);
                    let (stop, stopped) = oneshot::channel();
                    let task = tokio::spawn(heartbeat(
                        lock_path.clone(),
                        info.clone(),
                        self.heartbeat_interval,
                        stopped,
                    ));
                    return Ok(RunLock {
                        lock_path,
                        owner: info,
                        heartbeat: Some((stop, task)),
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }

            match read_lock_info(&lock_path).await {
                Some(holder) if !holder.is_stale(self.stale_after) => {
                    return Err(StoreError::Locked {
                        id,
                        holder: format!("{} (pid {})", holder.holder, holder.pid),
                        since: holder.acquired_at,
                    });
                }
                Some(holder) => tracing::warn!(
                    "Removing stale lock from {} (pid {}, last seen {})",
                    holder.holder,
                    holder.pid,
                    holder.last_seen()
                ),
                None => tracing::warn!("Removing unreadable lock {}", lock_path.display()),
            }
            match fs::remove_file(&lock_path).await {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }

        Err(StoreError::Locked {
            id,
            holder: "another process".to_string(),
            since: Utc::now(),
        })
    }
}

//! Task orchestration: submission, background execution, status queries
//!
//! Submit validates and persists a pending task, stages the payload, and
//! spawns exactly one Execute run. Each run owns its own error boundary and
//! reports only through the task store and the notification hub.

use bytes::Bytes;
use dashmap::DashMap;
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;
use uuid::Uuid;

use super::staging::StagedFile;
use crate::config::DocflowConfig;
use crate::error::{Error, Result};
use crate::ingestion::TextExtractor;
use crate::notifications::NotificationHub;
use crate::providers::InferenceClient;
use crate::storage::TaskStore;
use crate::types::{OwnerId, PushEvent, StatusUpdate, Task, TaskKind};

const ABORTED_AT_SHUTDOWN: &str = "Processing aborted at shutdown";

/// Limits applied by the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_file_size: u64,
    pub upload_dir: PathBuf,
    pub max_concurrent_tasks: usize,
    pub inference_timeout: Duration,
    pub default_list_limit: usize,
    pub max_list_limit: usize,
}

impl OrchestratorSettings {
    pub fn from_config(config: &DocflowConfig) -> Self {
        Self {
            max_file_size: config.processing.max_file_size,
            upload_dir: config.processing.upload_dir.clone(),
            max_concurrent_tasks: config.processing.max_concurrent_tasks,
            inference_timeout: Duration::from_secs(config.llm.timeout_secs),
            default_list_limit: config.processing.default_list_limit,
            max_list_limit: config.processing.max_list_limit,
        }
    }
}

/// One upload as received at the boundary
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub owner: OwnerId,
    pub filename: String,
    pub data: Bytes,
    /// Raw task kind; parsed during validation
    pub task_kind: String,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    extractor: Arc<dyn TextExtractor>,
    inference: Arc<dyn InferenceClient>,
    hub: Arc<NotificationHub>,
    settings: OrchestratorSettings,
    permits: Arc<Semaphore>,
    /// Runs scheduled and not yet finished, by task id
    active: DashMap<Uuid, Task>,
}

/// Drives tasks from submission through their state machine
pub struct TaskOrchestrator {
    inner: Arc<Inner>,
    runs: Mutex<JoinSet<()>>,
    closed: AtomicBool,
}

impl TaskOrchestrator {
    pub fn new(
        store: Arc<dyn TaskStore>,
        extractor: Arc<dyn TextExtractor>,
        inference: Arc<dyn InferenceClient>,
        hub: Arc<NotificationHub>,
        settings: OrchestratorSettings,
    ) -> Self {
        tracing::info!(
            "Orchestrator configured: {} concurrent runs, {}s inference timeout, {} byte upload limit",
            settings.max_concurrent_tasks,
            settings.inference_timeout.as_secs(),
            settings.max_file_size
        );

        Self {
            inner: Arc::new(Inner {
                store,
                extractor,
                inference,
                hub,
                permits: Arc::new(Semaphore::new(settings.max_concurrent_tasks.max(1))),
                active: DashMap::new(),
                settings,
            }),
            runs: Mutex::new(JoinSet::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.inner.settings
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.inner.store
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        &self.inner.hub
    }

    /// Runs spawned and not yet reaped
    pub fn in_flight(&self) -> usize {
        let mut runs = self.runs.lock();
        while runs.try_join_next().is_some() {}
        runs.len()
    }

    /// Accept an upload and schedule its Execute run.
    ///
    /// Size and kind are checked before anything is written. The returned task
    /// is the pending snapshot; processing happens in the background.
    pub async fn submit(&self, request: SubmitRequest) -> Result<Task> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::internal("service is shutting down"));
        }

        let size = request.data.len() as u64;
        if size > self.inner.settings.max_file_size {
            return Err(Error::PayloadTooLarge {
                size,
                max: self.inner.settings.max_file_size,
            });
        }
        let kind: TaskKind = request.task_kind.parse()?;

        let filename = display_name(&request.filename);
        let task = Task::new(request.owner, filename, size, kind);

        let mut staged = StagedFile::write(
            &self.inner.settings.upload_dir,
            task.id,
            &task.filename,
            &request.data,
        )
        .await?;

        if let Err(e) = self.inner.store.create(&task).await {
            tracing::error!("[{}] Failed to persist new task: {}", task.id, e);
            if let Err(cleanup) = staged.release().await {
                tracing::warn!("[{}] Could not remove staged file: {}", task.id, cleanup);
            }
            return Err(match e {
                Error::Persistence(msg) => Error::Persistence(msg),
                other => Error::persistence(other.to_string()),
            });
        }

        tracing::info!(
            "[{}] Accepted '{}' ({} bytes, {}) for owner {}",
            task.id,
            task.filename,
            task.file_size,
            task.kind,
            task.owner
        );

        let inner = Arc::clone(&self.inner);
        let snapshot = task.clone();
        inner.active.insert(task.id, task.clone());
        {
            let mut runs = self.runs.lock();
            while runs.try_join_next().is_some() {}
            runs.spawn(async move { inner.execute_guarded(snapshot, staged).await });
        }

        Ok(task)
    }

    /// Snapshot of one task; tasks owned by someone else are reported as not found
    pub async fn get_status(&self, owner: OwnerId, task_id: Uuid) -> Result<Task> {
        let task = self.inner.store.get(task_id).await?;
        if task.owner != owner {
            return Err(Error::NotFound(task_id.to_string()));
        }
        Ok(task)
    }

    /// Owner's tasks, newest first
    pub async fn list_tasks(&self, owner: OwnerId, limit: Option<usize>) -> Result<Vec<Task>> {
        let limit = limit
            .unwrap_or(self.inner.settings.default_list_limit)
            .min(self.inner.settings.max_list_limit);
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.inner.store.list(owner, limit).await
    }

    /// Wait until every spawned run has finished, including runs spawned meanwhile
    pub async fn wait_idle(&self) {
        loop {
            let mut runs = std::mem::take(&mut *self.runs.lock());
            if runs.is_empty() {
                return;
            }
            while runs.join_next().await.is_some() {}
        }
    }

    /// Stop accepting submissions and wait up to `grace` for in-flight runs.
    ///
    /// Runs still going after `grace` are aborted and their tasks recorded as
    /// failed. Staged files of aborted runs are removed on drop.
    pub async fn shutdown(&self, grace: Duration) {
        self.closed.store(true, Ordering::Release);
        let pending = self.in_flight();
        if pending > 0 {
            tracing::info!("Waiting up to {:?} for {} in-flight run(s)", grace, pending);
        }

        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let mut runs = std::mem::take(&mut *self.runs.lock());
            if runs.is_empty() {
                return;
            }
            let drained = tokio::time::timeout_at(deadline, async {
                while runs.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                tracing::warn!("Aborting {} run(s) still in flight after {:?}", runs.len(), grace);
                runs.abort_all();
                while runs.join_next().await.is_some() {}
                self.inner.fail_aborted().await;
                return;
            }
        }
    }
}

impl Inner {
    /// Execute with a panic boundary so no failure escapes the run
    async fn execute_guarded(self: Arc<Self>, task: Task, staged: StagedFile) {
        let _permit = Arc::clone(&self.permits).acquire_owned().await.ok();
        let id = task.id;
        let owner = task.owner;

        let outcome = AssertUnwindSafe(self.execute(task.clone(), staged))
            .catch_unwind()
            .await;

        if let Err(panic) = outcome {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!("[{}] Execute run panicked: {}", id, detail);

            let message = format!("Internal error during processing: {}", detail);
            match self.store.update_status(id, &StatusUpdate::failed(&message)).await {
                Ok(snapshot) => {
                    self.hub.push(owner, &PushEvent::failed(&snapshot, &message));
                }
                Err(e) => {
                    tracing::error!("[{}] Could not record failure after panic: {}", id, e);
                }
            }
        }
        self.active.remove(&id);
    }

    /// Record runs cut off at shutdown as failed
    async fn fail_aborted(&self) {
        let aborted: Vec<Task> = self
            .active
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.active.clear();

        for task in aborted {
            match self
                .store
                .update_status(task.id, &StatusUpdate::failed(ABORTED_AT_SHUTDOWN))
                .await
            {
                Ok(snapshot) => {
                    self.hub
                        .push(task.owner, &PushEvent::failed(&snapshot, ABORTED_AT_SHUTDOWN));
                }
                Err(e) => {
                    tracing::warn!("[{}] Could not record abort at shutdown: {}", task.id, e);
                }
            }
        }
    }

    /// The Execute run for one accepted submission
    async fn execute(&self, task: Task, mut staged: StagedFile) {
        let id = task.id;
        let owner = task.owner;
        let started = std::time::Instant::now();

        // Step 1: pending -> processing
        let task = match self.store.update_status(id, &StatusUpdate::processing()).await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("[{}] Failed to persist processing status: {}", id, e);
                let message = format!("Could not start processing: {}", e);
                let update = StatusUpdate::failed(&message);
                let snapshot = match self.store.update_status(id, &update).await {
                    Ok(snapshot) => snapshot,
                    Err(e) => {
                        tracing::error!("[{}] Failed to persist failed status: {}", id, e);
                        local_snapshot(&task, &update)
                    }
                };
                self.hub.push(owner, &PushEvent::failed(&snapshot, &message));
                release(&mut staged, id).await;
                return;
            }
        };
        self.hub.push(owner, &PushEvent::started(&task));
        tracing::info!("[{}] Processing '{}' ({})", id, task.filename, task.kind);

        // Steps 2-3: extraction then inference
        let outcome = self.process(&task, &staged).await;

        // Steps 4-5: terminal status
        let update = match &outcome {
            Ok(result) => StatusUpdate::completed(result.as_str()),
            Err(e) => StatusUpdate::failed(e.to_string()),
        };
        let snapshot = match self.store.update_status(id, &update).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                // Polling stays authoritative; the event still goes out
                tracing::error!(
                    "[{}] Failed to persist {} status: {}",
                    id,
                    update.status,
                    e
                );
                local_snapshot(&task, &update)
            }
        };

        let event = match &outcome {
            Ok(_) => {
                tracing::info!(
                    "[{}] Completed in {:.1}s",
                    id,
                    started.elapsed().as_secs_f64()
                );
                PushEvent::completed(&snapshot)
            }
            Err(e) => {
                tracing::warn!(
                    "[{}] Failed after {:.1}s ({:?}): {}",
                    id,
                    started.elapsed().as_secs_f64(),
                    e.class(),
                    e
                );
                PushEvent::failed(&snapshot, &e.to_string())
            }
        };
        self.hub.push(owner, &event);

        // Step 6
        release(&mut staged, id).await;
    }

    async fn process(&self, task: &Task, staged: &StagedFile) -> Result<String> {
        let data = staged.read().await.map_err(|e| {
            Error::extraction(&task.filename, format!("staged upload unreadable: {}", e))
        })?;

        let extractor = Arc::clone(&self.extractor);
        let filename = task.filename.clone();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&filename, &data))
            .await
            .map_err(|e| Error::extraction(&task.filename, format!("extractor crashed: {}", e)))??;
        tracing::debug!("[{}] Extracted {} chars", task.id, text.chars().count());

        let budget = self.settings.inference_timeout;
        let result = match timeout(budget, self.inference.infer(&text, task.kind)).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::InferenceTimeout(budget.as_secs())),
        };

        if result.trim().is_empty() {
            return Err(Error::inference("model returned an empty result"));
        }
        Ok(result)
    }
}

/// Task as it would look after `update`, for events whose write failed
fn local_snapshot(task: &Task, update: &StatusUpdate) -> Task {
    let mut snapshot = task.clone();
    snapshot.status = update.status;
    snapshot.result = update.result.clone();
    snapshot.error = update.error.clone();
    snapshot.updated_at = chrono::Utc::now().max(task.updated_at);
    snapshot
}

async fn release(staged: &mut StagedFile, id: Uuid) {
    if let Err(e) = staged.release().await {
        tracing::warn!("[{}] Could not remove staged file: {}", id, e);
    }
}

/// Client filename without directory components
fn display_name(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

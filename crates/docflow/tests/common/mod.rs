#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use docflow::config::{DocflowConfig, StorageBackend};
use docflow::error::{Error, Result};
use docflow::generation::PromptBuilder;
use docflow::ingestion::{ExtractorRegistry, TextExtractor};
use docflow::notifications::NotificationHub;
use docflow::processing::{OrchestratorSettings, TaskOrchestrator};
use docflow::providers::InferenceClient;
use docflow::storage::{InMemoryTaskStore, TaskStore};
use docflow::types::{OwnerId, StatusUpdate, Task, TaskKind};
use uuid::Uuid;

/// Inference double: answers with a fixed reply after an optional delay
pub struct StubInference {
    reply: String,
    delay: Duration,
    fail_with: Option<String>,
    panic_with: Option<String>,
    calls: AtomicUsize,
    prompts: PromptBuilder,
}

impl StubInference {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            delay: Duration::ZERO,
            fail_with: None,
            panic_with: None,
            calls: AtomicUsize::new(0),
            prompts: PromptBuilder::default(),
        }
    }

    pub fn slow(reply: &str, delay: Duration) -> Self {
        Self {
            delay,
            ..Self::replying(reply)
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::replying("")
        }
    }

    /// Panics inside `infer` instead of answering
    pub fn panicking(message: &str) -> Self {
        Self {
            panic_with: Some(message.to_string()),
            ..Self::replying("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InferenceClient for StubInference {
    async fn infer(&self, text: &str, kind: TaskKind) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.build(text, kind)?;
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(message) = &self.panic_with {
            panic!("{}", message);
        }
        match &self.fail_with {
            Some(message) => Err(Error::inference(message.clone())),
            None => Ok(self.reply.clone()),
        }
    }

    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }

    fn name(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }
}

/// Extractor double that panics on every call
pub struct PanickingExtractor;

impl TextExtractor for PanickingExtractor {
    fn extract(&self, filename: &str, _data: &[u8]) -> Result<String> {
        panic!("extractor blew up on {}", filename);
    }
}

/// Store double over [`InMemoryTaskStore`] with switchable write failures
pub struct FaultyStore {
    inner: Arc<InMemoryTaskStore>,
    fail_create: AtomicBool,
    fail_terminal: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryTaskStore>) -> Self {
        Self {
            inner,
            fail_create: AtomicBool::new(false),
            fail_terminal: AtomicBool::new(false),
        }
    }

    /// Every `create` fails with a persistence error
    pub fn fail_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Every update to completed or failed fails with a persistence error
    pub fn fail_terminal_writes(&self) {
        self.fail_terminal.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskStore for FaultyStore {
    async fn create(&self, task: &Task) -> Result<()> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::persistence("db down"));
        }
        self.inner.create(task).await
    }

    async fn update_status(&self, id: Uuid, update: &StatusUpdate) -> Result<Task> {
        if update.status.is_terminal() && self.fail_terminal.load(Ordering::SeqCst) {
            return Err(Error::persistence("db down"));
        }
        self.inner.update_status(id, update).await
    }

    async fn get(&self, id: Uuid) -> Result<Task> {
        self.inner.get(id).await
    }

    async fn list(&self, owner: OwnerId, limit: usize) -> Result<Vec<Task>> {
        self.inner.list(owner, limit).await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

/// Orchestrator wired to in-memory parts, with handles the tests inspect
pub struct Harness {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub store: Arc<InMemoryTaskStore>,
    /// Fault switches in front of `store`; off by default
    pub faults: Arc<FaultyStore>,
    pub hub: Arc<NotificationHub>,
    pub inference: Arc<StubInference>,
    pub config: DocflowConfig,
    pub upload_dir: TempDir,
}

impl Harness {
    pub fn new(inference: StubInference) -> Self {
        Self::with_config(inference, |_| {})
    }

    pub fn with_config(inference: StubInference, configure: impl FnOnce(&mut DocflowConfig)) -> Self {
        Self::build(inference, Arc::new(ExtractorRegistry::with_defaults()), configure)
    }

    pub fn with_extractor(inference: StubInference, extractor: Arc<dyn TextExtractor>) -> Self {
        Self::build(inference, extractor, |_| {})
    }

    fn build(
        inference: StubInference,
        extractor: Arc<dyn TextExtractor>,
        configure: impl FnOnce(&mut DocflowConfig),
    ) -> Self {
        let upload_dir = tempfile::tempdir().expect("tempdir must be created");

        let mut config = DocflowConfig::default();
        config.processing.upload_dir = upload_dir.path().to_path_buf();
        config.processing.max_concurrent_tasks = 4;
        config.storage.backend = StorageBackend::Memory;
        config.auth.jwt_secret = "test-secret".to_string();
        configure(&mut config);

        let store = Arc::new(InMemoryTaskStore::new());
        let faults = Arc::new(FaultyStore::new(Arc::clone(&store)));
        let hub = Arc::new(NotificationHub::new());
        let inference = Arc::new(inference);

        let store_dyn: Arc<dyn TaskStore> = faults.clone();
        let inference_dyn: Arc<dyn InferenceClient> = inference.clone();
        let orchestrator = Arc::new(TaskOrchestrator::new(
            store_dyn,
            extractor,
            inference_dyn,
            Arc::clone(&hub),
            OrchestratorSettings::from_config(&config),
        ));

        Self {
            orchestrator,
            store,
            faults,
            hub,
            inference,
            config,
            upload_dir,
        }
    }

    /// Files still present in the upload directory
    pub fn staged_files(&self) -> usize {
        std::fs::read_dir(self.upload_dir.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

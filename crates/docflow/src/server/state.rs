//! Application state for the processing server

use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{Authenticator, JwtAuthenticator};
use crate::config::{DocflowConfig, StorageBackend};
use crate::error::Result;
use crate::ingestion::ExtractorRegistry;
use crate::notifications::NotificationHub;
use crate::processing::{OrchestratorSettings, TaskOrchestrator};
use crate::providers::create_inference_client;
use crate::storage::{InMemoryTaskStore, SqliteTaskStore, TaskStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: DocflowConfig,
    /// Submission, execution and status queries
    orchestrator: Arc<TaskOrchestrator>,
    /// Bearer credential validation
    authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Create application state from configuration.
    ///
    /// Must be called inside a Tokio runtime; the hub keepalive task starts here.
    pub fn new(config: DocflowConfig) -> Result<Self> {
        config.validate()?;
        tracing::info!("Initializing docflow state (storage: {:?})...", config.storage.backend);

        let store: Arc<dyn TaskStore> = match config.storage.backend {
            StorageBackend::Sqlite => {
                let store = SqliteTaskStore::new(&config.storage.database_path)?;
                tracing::info!("Task store opened at {}", config.storage.database_path.display());
                Arc::new(store)
            }
            StorageBackend::Memory => {
                tracing::warn!("Using in-memory task store; tasks are lost on restart");
                Arc::new(InMemoryTaskStore::new())
            }
        };

        let extractors = ExtractorRegistry::with_defaults();
        tracing::info!(
            "Extractors registered for: {}",
            extractors.supported_extensions().join(", ")
        );

        let inference = create_inference_client(&config.llm)?;

        let hub = Arc::new(NotificationHub::new());
        hub.start_keepalive(Duration::from_secs(config.notifications.keepalive_secs));

        let orchestrator = Arc::new(TaskOrchestrator::new(
            store,
            Arc::new(extractors),
            inference,
            hub,
            OrchestratorSettings::from_config(&config),
        ));

        let authenticator: Arc<dyn Authenticator> = Arc::new(JwtAuthenticator::new(
            &config.auth.jwt_secret,
            config.auth.leeway_secs,
        ));

        Ok(Self::from_parts(config, orchestrator, authenticator))
    }

    /// Assemble state from already-built components
    pub fn from_parts(
        config: DocflowConfig,
        orchestrator: Arc<TaskOrchestrator>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                orchestrator,
                authenticator,
            }),
        }
    }

    pub fn config(&self) -> &DocflowConfig {
        &self.inner.config
    }

    pub fn orchestrator(&self) -> &Arc<TaskOrchestrator> {
        &self.inner.orchestrator
    }

    pub fn hub(&self) -> &Arc<NotificationHub> {
        self.inner.orchestrator.hub()
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        self.inner.orchestrator.store()
    }

    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.inner.authenticator
    }
}

impl FromRef<AppState> for Arc<dyn Authenticator> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.inner.authenticator)
    }
}

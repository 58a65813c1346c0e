//! HTTP server for the processing service

pub mod routes;
pub mod state;

use axum::{extract::State, routing::get, Json, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::DocflowConfig;
use crate::error::{Error, Result};
use crate::types::{HealthResponse, TaskKind};
use state::AppState;

/// Service name reported by `/health` and `/`
pub const SERVICE_NAME: &str = "docflow";

/// Docflow HTTP server
pub struct DocflowServer {
    config: DocflowConfig,
    state: AppState,
}

impl DocflowServer {
    /// Create a new server; must be called inside a Tokio runtime
    pub fn new(config: DocflowConfig) -> Result<Self> {
        let state = AppState::new(config.clone())?;
        Ok(Self { config, state })
    }

    /// Create from prepared state
    pub fn with_state(state: AppState) -> Self {
        Self {
            config: state.config().clone(),
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Start the server and run until Ctrl-C.
    ///
    /// On shutdown the hub is closed first (which ends every push socket),
    /// then in-flight runs get `server.shutdown_grace_secs` to finish.
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = build_router(self.state.clone());

        tracing::info!("Starting docflow server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        let hub = std::sync::Arc::clone(self.state.hub());
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutdown requested");
                hub.shutdown();
            })
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        self.state
            .orchestrator()
            .shutdown(Duration::from_secs(self.config.server.shutdown_grace_secs))
            .await;
        tracing::info!("Server stopped");
        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        format!("{}:{}", self.config.server.host, self.config.server.port)
    }
}

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    let max_file_size = state.config().processing.max_file_size;
    let enable_cors = state.config().server.enable_cors;

    let router = Router::new()
        .route("/", get(service_info))
        .route("/health", get(health_check))
        .nest("/process", routes::process_routes(max_file_size))
        .nest("/auth", routes::auth_routes())
        .with_state(state)
        // Middleware layers (order matters - applied bottom to top)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = match state.store().ping().await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}

/// Service info endpoint
async fn service_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    let task_types: Vec<&str> = TaskKind::ALL.iter().map(TaskKind::as_str).collect();
    Json(serde_json::json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Asynchronous document processing with live push notifications",
        "task_types": task_types,
        "max_file_size": state.config().processing.max_file_size,
        "endpoints": {
            "POST /process/submit": "Upload a file for background processing (202)",
            "GET /process/tasks": "List your tasks, newest first",
            "GET /process/tasks/:task_id": "Get task status and result",
            "GET /process/ws/:user_id?token=JWT": "Live task updates",
            "POST /auth/validate-token": "Validate a bearer token",
            "GET /health": "Service and database health"
        },
        "live_connections": state.hub().connection_count(),
    }))
}

//! API routes for the processing server

pub mod auth;
pub mod process;
pub mod ws;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Room for multipart boundaries and the non-file fields
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Routes under `/process`
pub fn process_routes(max_file_size: u64) -> Router<AppState> {
    let body_limit = usize::try_from(max_file_size)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    Router::new()
        // Submission - body limit sized for the largest accepted upload
        .route(
            "/submit",
            post(process::submit).layer(DefaultBodyLimit::max(body_limit)),
        )
        .route("/tasks", get(process::list_tasks))
        .route("/tasks/:task_id", get(process::get_task))
        // Live push channel
        .route("/ws/:user_id", get(ws::connect))
}

/// Routes under `/auth`
pub fn auth_routes() -> Router<AppState> {
    Router::new().route("/validate-token", post(auth::validate_token))
}

//! Submission and status endpoints

use axum::{
    extract::{multipart::MultipartError, Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use serde::Deserialize;
use uuid::Uuid;

use super::MULTIPART_OVERHEAD;
use crate::auth::AuthenticatedUser;
use crate::error::{Error, Result};
use crate::processing::SubmitRequest;
use crate::server::state::AppState;
use crate::types::{OwnerId, SubmitResponse, TaskKind, TaskStatusResponse};

/// Query string of `GET /process/tasks`
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// POST /process/submit - Accept a file and schedule processing
///
/// Multipart fields: `file` (required), `task_type` (default `summarize`),
/// `user_id` (optional; must equal the authenticated owner).
pub async fn submit(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SubmitResponse>)> {
    let max_file_size = state.orchestrator().settings().max_file_size;
    let read_error = |e: MultipartError| multipart_error(e, max_file_size);

    let mut upload: Option<(String, Bytes)> = None;
    let mut task_kind: Option<String> = None;
    let mut requested_owner: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(read_error)? {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(read_error)?;
                upload = Some((filename, data));
            }
            "task_type" => task_kind = Some(field.text().await.map_err(read_error)?),
            "user_id" => requested_owner = Some(field.text().await.map_err(read_error)?),
            other => tracing::debug!("Ignoring multipart field '{}'", other),
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| Error::invalid_request("Missing form field 'file'"))?;
    check_requested_owner(owner, requested_owner.as_deref())?;

    let task_kind = task_kind
        .map(|kind| kind.trim().to_string())
        .filter(|kind| !kind.is_empty())
        .unwrap_or_else(|| TaskKind::default().as_str().to_string());

    let task = state
        .orchestrator()
        .submit(SubmitRequest {
            owner,
            filename,
            data,
            task_kind,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitResponse::accepted(&task))))
}

/// GET /process/tasks/:task_id - Snapshot of one of the caller's tasks
pub async fn get_task(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>> {
    let task_id = Uuid::parse_str(task_id.trim())
        .map_err(|_| Error::invalid_request("Invalid task ID format."))?;

    let task = state.orchestrator().get_status(owner, task_id).await?;
    Ok(Json(task.into()))
}

/// GET /process/tasks - The caller's tasks, newest first
pub async fn list_tasks(
    State(state): State<AppState>,
    AuthenticatedUser(owner): AuthenticatedUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TaskStatusResponse>>> {
    let tasks = state.orchestrator().list_tasks(owner, query.limit).await?;
    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

/// A `user_id` form field may only restate the authenticated owner
fn check_requested_owner(owner: OwnerId, requested: Option<&str>) -> Result<()> {
    let Some(raw) = requested.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(());
    };
    let requested: i64 = raw
        .parse()
        .map_err(|_| Error::invalid_request(format!("user_id must be an integer, got '{}'", raw)))?;
    if requested != owner.0 {
        tracing::warn!("Owner {} tried to submit on behalf of {}", owner, requested);
        return Err(Error::OwnerOverride { requested });
    }
    Ok(())
}

/// Body-limit rejections surface as payload errors, the rest as bad input
fn multipart_error(e: MultipartError, max_file_size: u64) -> Error {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        Error::PayloadTooLarge {
            size: max_file_size.saturating_add(MULTIPART_OVERHEAD as u64),
            max: max_file_size,
        }
    } else {
        Error::invalid_request(format!("Failed to read multipart body: {}", e.body_text()))
    }
}

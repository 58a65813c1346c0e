//! Response types for the HTTP boundary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{OwnerId, Task, TaskKind, TaskStatus};

/// Acknowledgment returned by Submit before any processing happens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub message: String,
    pub filename: String,
    pub task_type: TaskKind,
}

impl SubmitResponse {
    pub fn accepted(task: &Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            message: "File accepted for processing. Connect to WebSocket for live updates."
                .to_string(),
            filename: task.filename.clone(),
            task_type: task.kind,
        }
    }
}

/// Full task snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatusResponse {
    pub task_id: Uuid,
    pub status: TaskStatus,
    pub filename: String,
    pub task_type: TaskKind,
    pub file_size: u64,
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            task_id: task.id,
            status: task.status,
            filename: task.filename,
            task_type: task.kind,
            file_size: task.file_size,
            result: task.result,
            error_message: task.error,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

/// Outcome of validating a bearer credential out-of-band
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<OwnerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TokenValidation {
    pub fn valid(owner: OwnerId) -> Self {
        Self {
            valid: true,
            user_id: Some(owner),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            user_id: None,
            error: Some(error.into()),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub database: String,
}

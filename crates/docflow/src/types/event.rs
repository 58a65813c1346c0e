//! Push events delivered over live channels

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{Task, TaskStatus};

/// Kind of push event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "task_started")]
    Started,
    #[serde(rename = "task_completed")]
    Completed,
    #[serde(rename = "task_failed")]
    Failed,
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "connected")]
    Connected,
}

/// Immutable status-change message; never persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushEvent {
    pub event: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl PushEvent {
    fn for_task(event: EventKind, task: &Task, message: String) -> Self {
        Self {
            event,
            task_id: Some(task.id),
            filename: Some(task.filename.clone()),
            status: Some(task.status),
            message,
            timestamp: Utc::now(),
        }
    }

    pub fn started(task: &Task) -> Self {
        let message = format!("Started processing '{}'...", task.filename);
        Self::for_task(EventKind::Started, task, message)
    }

    pub fn completed(task: &Task) -> Self {
        let message = format!("Processing complete for '{}'", task.filename);
        Self::for_task(EventKind::Completed, task, message)
    }

    pub fn failed(task: &Task, error: &str) -> Self {
        let message = format!("Processing failed for '{}': {}", task.filename, error);
        Self::for_task(EventKind::Failed, task, message)
    }

    pub fn ping(message: impl Into<String>) -> Self {
        Self {
            event: EventKind::Ping,
            task_id: None,
            filename: None,
            status: None,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn connected(owner: super::OwnerId) -> Self {
        Self {
            event: EventKind::Connected,
            task_id: None,
            filename: None,
            status: None,
            message: format!("Connected! Listening for task updates for user {}.", owner),
            timestamp: Utc::now(),
        }
    }
}

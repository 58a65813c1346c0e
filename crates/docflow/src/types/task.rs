//! Task record and its state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Authenticated principal that owns tasks and push channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(pub i64);

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for OwnerId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Processing template applied to extracted text
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    #[default]
    Summarize,
    ExtractKeywords,
    Sentiment,
    Translate,
    Qa,
}

impl TaskKind {
    /// Every recognized kind
    pub const ALL: [TaskKind; 5] = [
        TaskKind::Summarize,
        TaskKind::ExtractKeywords,
        TaskKind::Sentiment,
        TaskKind::Translate,
        TaskKind::Qa,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Summarize => "summarize",
            TaskKind::ExtractKeywords => "extract_keywords",
            TaskKind::Sentiment => "sentiment",
            TaskKind::Translate => "translate",
            TaskKind::Qa => "qa",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TaskKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::InvalidTaskKind(s.to_string()))
    }
}

/// Task lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TaskStatus {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        }
    }

    /// Completed or failed
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Transitions only move forward along pending -> processing -> {completed, failed}.
    /// A pending task may fail directly when the run cannot start.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        matches!(
            (self, next),
            (TaskStatus::Pending, TaskStatus::Processing)
                | (TaskStatus::Pending, TaskStatus::Failed)
                | (TaskStatus::Processing, TaskStatus::Completed)
                | (TaskStatus::Processing, TaskStatus::Failed)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "processing" => Ok(TaskStatus::Processing),
            "completed" => Ok(TaskStatus::Completed),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(Error::persistence(format!("unknown task status '{}'", other))),
        }
    }
}

/// Status change applied by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl StatusUpdate {
    pub fn processing() -> Self {
        Self {
            status: TaskStatus::Processing,
            result: None,
            error: None,
        }
    }

    pub fn completed(result: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Completed,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Failed update; an empty message is replaced so the error detail is never blank
    pub fn failed(error: impl Into<String>) -> Self {
        let error = error.into();
        let error = if error.trim().is_empty() {
            "unknown error".to_string()
        } else {
            error
        };
        Self {
            status: TaskStatus::Failed,
            result: None,
            error: Some(error),
        }
    }
}

/// One submitted unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub owner: OwnerId,
    pub filename: String,
    pub file_size: u64,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// New pending task with a fresh identifier
    pub fn new(owner: OwnerId, filename: impl Into<String>, file_size: u64, kind: TaskKind) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            owner,
            filename: filename.into(),
            file_size,
            kind,
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a status update in place, enforcing the state machine.
    ///
    /// Result and error are replaced wholesale so that at most one of them is
    /// ever set, and neither is set before a terminal status.
    pub fn apply(&mut self, update: &StatusUpdate, at: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(update.status) {
            return Err(Error::InvalidTransition {
                from: self.status,
                to: update.status,
            });
        }
        self.status = update.status;
        self.result = update.result.clone();
        self.error = update.error.clone();
        self.updated_at = at;
        Ok(())
    }
}

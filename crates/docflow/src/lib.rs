//! docflow: asynchronous document processing with live push notifications
//!
//! Uploads are accepted immediately as pending tasks, processed in the
//! background (text extraction followed by a language-model call), and their
//! progress is pushed to every open channel of the owner while the task store
//! stays authoritative for polling.

pub mod auth;
pub mod config;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod notifications;
pub mod processing;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::DocflowConfig;
pub use error::{Error, ErrorClass, Result};
pub use processing::{SubmitRequest, TaskOrchestrator};
pub use types::{OwnerId, PushEvent, Task, TaskKind, TaskStatus};

//! Core types for the processing service

pub mod event;
pub mod response;
pub mod task;

pub use event::{EventKind, PushEvent};
pub use response::{HealthResponse, SubmitResponse, TaskStatusResponse, TokenValidation};
pub use task::{OwnerId, StatusUpdate, Task, TaskKind, TaskStatus};

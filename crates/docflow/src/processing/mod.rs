//! Background task execution

mod orchestrator;
mod staging;

pub use orchestrator::{OrchestratorSettings, SubmitRequest, TaskOrchestrator};
pub use staging::{sanitize_filename, StagedFile};

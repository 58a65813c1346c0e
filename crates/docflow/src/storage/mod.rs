//! Storage module for task records
//!
//! The orchestrator writes through the [`TaskStore`] trait; SQLite is the
//! durable backend and the in-memory store serves tests and ephemeral runs.

mod database;
mod task_store;

pub use database::SqliteTaskStore;
pub use task_store::{InMemoryTaskStore, TaskStore};

//! Prompt construction for inference requests

pub mod prompt;

pub use prompt::{Prompt, PromptBuilder, SYSTEM_PROMPT, TRUNCATION_MARKER};

//! Inference backends
//!
//! The orchestrator depends only on [`InferenceClient`]; the backend is
//! chosen from configuration at startup.

pub mod llm;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

pub use llm::InferenceClient;
pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::config::{LlmConfig, LlmProvider};
use crate::error::Result;

/// Build the configured inference backend
pub fn create_inference_client(config: &LlmConfig) -> Result<Arc<dyn InferenceClient>> {
    let client: Arc<dyn InferenceClient> = match config.provider {
        LlmProvider::OpenAi => Arc::new(OpenAiClient::new(config)?),
        LlmProvider::Ollama => Arc::new(OllamaClient::new(config)?),
    };
    tracing::info!("Inference backend: {} ({})", client.name(), client.model());
    Ok(client)
}

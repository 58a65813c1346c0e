//! Inference capability consumed by the orchestrator

use async_trait::async_trait;

use crate::error::Result;
use crate::types::TaskKind;

/// Maps extracted text and a task kind to result text.
///
/// Implementations apply the truncation policy before calling the model and
/// treat an empty model reply as a failure.
///
/// Implementations:
/// - `OpenAiClient`: OpenAI-compatible chat completions
/// - `OllamaClient`: local Ollama server
#[async_trait]
pub trait InferenceClient: Send + Sync {
    async fn infer(&self, text: &str, kind: TaskKind) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> Result<bool>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}

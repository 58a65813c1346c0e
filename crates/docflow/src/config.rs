//! Configuration for the processing service

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocflowConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Submission and execution limits
    #[serde(default)]
    pub processing: ProcessingConfig,
    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Credential validation
    #[serde(default)]
    pub auth: AuthConfig,
    /// Push channel configuration
    #[serde(default)]
    pub notifications: NotificationConfig,
    /// Task store configuration
    #[serde(default)]
    pub storage: StorageConfig,
}

impl DocflowConfig {
    /// Load configuration from an optional TOML file, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                toml::from_str(&raw)
                    .map_err(|e| Error::Config(format!("invalid {}: {}", path.display(), e)))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("DOCFLOW_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("DOCFLOW_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("DOCFLOW_PORT is not a port: {}", port)))?;
        }
        if let Some(secret) = lookup("DOCFLOW_JWT_SECRET") {
            self.auth.jwt_secret = secret;
        }
        if let Some(dir) = lookup("DOCFLOW_UPLOAD_DIR") {
            self.processing.upload_dir = PathBuf::from(dir);
        }
        if let Some(path) = lookup("DOCFLOW_DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }
        if let Some(mb) = lookup("DOCFLOW_MAX_FILE_SIZE_MB") {
            let mb: u64 = mb.parse().map_err(|_| {
                Error::Config(format!("DOCFLOW_MAX_FILE_SIZE_MB is not a number: {}", mb))
            })?;
            self.processing.max_file_size = mb.checked_mul(1024 * 1024).ok_or_else(|| {
                Error::Config(format!("DOCFLOW_MAX_FILE_SIZE_MB is too large: {}", mb))
            })?;
        }
        if let Some(provider) = lookup("DOCFLOW_LLM_PROVIDER") {
            self.llm.provider = match provider.to_ascii_lowercase().as_str() {
                "openai" => LlmProvider::OpenAi,
                "ollama" => LlmProvider::Ollama,
                other => {
                    return Err(Error::Config(format!("unknown LLM provider '{}'", other)));
                }
            };
        }
        if let Some(url) = lookup("DOCFLOW_LLM_BASE_URL") {
            self.llm.base_url = url;
        }
        if let Some(model) = lookup("DOCFLOW_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = Some(key);
        }
        Ok(())
    }

    /// Reject settings the service cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.processing.max_file_size == 0 {
            return Err(Error::Config("processing.max_file_size must be positive".into()));
        }
        if self.processing.max_concurrent_tasks == 0 {
            return Err(Error::Config(
                "processing.max_concurrent_tasks must be positive".into(),
            ));
        }
        if self.processing.default_list_limit == 0
            || self.processing.default_list_limit > self.processing.max_list_limit
        {
            return Err(Error::Config(
                "processing.default_list_limit must be between 1 and max_list_limit".into(),
            ));
        }
        if self.llm.timeout_secs == 0 {
            return Err(Error::Config("llm.timeout_secs must be positive".into()));
        }
        if self.llm.max_input_chars == 0 {
            return Err(Error::Config("llm.max_input_chars must be positive".into()));
        }
        if self.llm.provider == LlmProvider::OpenAi && self.llm.api_key.is_none() {
            return Err(Error::Config(
                "llm.api_key (or OPENAI_API_KEY) is required for the openai provider".into(),
            ));
        }
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(Error::Config(
                "auth.jwt_secret (or DOCFLOW_JWT_SECRET) must be set".into(),
            ));
        }
        if self.notifications.keepalive_secs == 0 || self.notifications.channel_capacity == 0 {
            return Err(Error::Config(
                "notifications.keepalive_secs and channel_capacity must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Seconds to wait for in-flight runs on shutdown
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8001,
            enable_cors: true,
            shutdown_grace_secs: 30,
        }
    }
}

/// Submission and execution limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Maximum upload size in bytes (default: 10MB)
    pub max_file_size: u64,
    /// Directory for staged uploads
    pub upload_dir: PathBuf,
    /// Execute runs allowed at once (default: CPU count, max 8)
    pub max_concurrent_tasks: usize,
    /// Page size when a list request names no limit
    pub default_list_limit: usize,
    /// Upper bound on any list request
    pub max_list_limit: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            upload_dir: std::env::temp_dir().join("docflow-uploads"),
            max_concurrent_tasks: num_cpus::get().clamp(1, 8),
            default_list_limit: 50,
            max_list_limit: 200,
        }
    }
}

/// Inference backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// OpenAI-compatible chat completions
    #[default]
    OpenAi,
    /// Local Ollama server
    Ollama,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// API base URL
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// Bearer key for the OpenAI provider
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    /// Temperature for generation
    pub temperature: f32,
    /// Output token cap
    pub max_tokens: u32,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Characters of extracted text sent to the model
    pub max_input_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-3.5-turbo".to_string(),
            api_key: None,
            temperature: 0.3,
            max_tokens: 1024,
            timeout_secs: 120,
            max_input_chars: 12_000,
        }
    }
}

/// Credential validation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret shared with the token issuer
    #[serde(default, skip_serializing)]
    pub jwt_secret: String,
    /// Tolerated clock skew when checking `exp`
    #[serde(default)]
    pub leeway_secs: u64,
}

/// Push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Idle ping interval
    pub keepalive_secs: u64,
    /// Outbound queue depth per channel
    pub channel_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            keepalive_secs: 30,
            channel_capacity: 256,
        }
    }
}

/// Task store backend
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

/// Task store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docflow")
            .join("tasks.db");

        Self {
            backend: StorageBackend::Sqlite,
            database_path,
        }
    }
}

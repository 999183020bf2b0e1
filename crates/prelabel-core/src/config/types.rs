//! Sub-configuration structs with defaults.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// LLM provider selection and per-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider identifier ("openai" or "ollama")
    pub provider: String,

    /// Maximum tokens the model may generate per query
    pub max_tokens: u32,

    /// OpenAI (or OpenAI-compatible) configuration
    pub openai: OpenAiConfig,

    /// Ollama (local) configuration
    pub ollama: OllamaConfig,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            max_tokens: 1000,
            openai: OpenAiConfig::default(),
            ollama: OllamaConfig::default(),
        }
    }
}

/// OpenAI configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    /// API key (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Chat Completions endpoint
    pub endpoint: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: "${OPENAI_API_KEY}".to_string(),
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            timeout_ms: 60_000,
        }
    }
}

/// Ollama configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    /// Ollama API endpoint
    pub endpoint: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            // Vision models running locally can be slow
            timeout_ms: 120_000,
        }
    }
}

/// Prompt strategy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Strategy identifier (fenced_json, single_label, multi_label, null)
    pub strategy: String,

    /// Provenance label stamped on every filled slot
    pub origin: String,

    /// Model identifier requested from the endpoint
    pub model: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            strategy: "fenced_json".to_string(),
            origin: "ChatGPT".to_string(),
            model: "gpt-4o".to_string(),
        }
    }
}

/// Label Studio server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelStudioConfig {
    /// Server base URL
    pub url: String,

    /// Access token (supports ${ENV_VAR} syntax)
    pub api_key: String,

    /// Project whose tasks are annotated
    pub project_id: u64,
}

impl Default for LabelStudioConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8080".to_string(),
            api_key: "${LABEL_STUDIO_API_KEY}".to_string(),
            project_id: 1,
        }
    }
}

/// Where task images are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageMode {
    /// `base_url` + task image path, fetched over HTTP
    Remote,
    /// Uploaded file name (upload prefix stripped) under `local_dir`
    Local,
}

/// Image resolution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Storage mode
    pub mode: ImageMode,

    /// Prefix for remote image URLs
    pub base_url: String,

    /// Directory holding the original image files (local mode)
    pub local_dir: String,

    /// Key of the image reference inside each task's `data`
    pub data_key: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            mode: ImageMode::Remote,
            base_url: "http://localhost:8080".to_string(),
            local_dir: "~/label-studio/media/upload".to_string(),
            data_key: "image".to_string(),
        }
    }
}

/// Annotation run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Result template skeleton (JSON)
    pub template_path: PathBuf,

    /// Max query attempts per task
    pub max_retries: u32,

    /// Base delay between attempts in milliseconds (exponential backoff)
    pub retry_delay_ms: u64,

    /// Annotate at most this many tasks (0 = all)
    pub limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("./template.json"),
            max_retries: 5,
            retry_delay_ms: 0,
            limit: 0,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

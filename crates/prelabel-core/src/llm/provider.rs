//! LLM provider trait and request/response types.
//!
//! Defines the interface that every model endpoint implements, plus the
//! factory that creates the configured provider.

use crate::config::LlmConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use base64::Engine;
use serde_json::Value;
use std::time::Duration;

/// Base64-encoded image ready to send to an LLM API.
#[derive(Debug, Clone)]
pub struct ImageInput {
    /// Base64-encoded image bytes
    pub data: String,
    /// MIME type (e.g., "image/jpeg", "image/png")
    pub media_type: String,
}

impl ImageInput {
    /// Create an `ImageInput` from raw bytes and format string.
    ///
    /// The format is the image format identifier (e.g., "jpeg", "png", "webp").
    pub fn from_bytes(bytes: &[u8], format: &str) -> Self {
        let media_type = match format.to_ascii_lowercase().as_str() {
            "jpeg" | "jpg" => "image/jpeg",
            "png" => "image/png",
            "webp" => "image/webp",
            "gif" => "image/gif",
            other => {
                tracing::warn!("Unknown image format '{other}', defaulting to image/jpeg");
                "image/jpeg"
            }
        };

        Self {
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
            media_type: media_type.to_string(),
        }
    }

    /// Return a data URL suitable for OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data)
    }
}

/// Strict JSON schema the model output must conform to.
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    /// Schema name reported to the endpoint
    pub name: String,
    /// JSON Schema document
    pub schema: Value,
}

/// One model query. Built fresh for every attempt.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The image to annotate
    pub image: ImageInput,
    /// User instruction text
    pub instruction: String,
    /// Optional system text
    pub system: Option<String>,
    /// Optional machine-checked output constraint
    pub response_schema: Option<ResponseSchema>,
    /// Model identifier to request
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
}

/// The response from an LLM call.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated text
    pub text: String,
    /// Model identifier reported by the endpoint
    pub model: String,
    /// Number of tokens used (input + output), if reported
    pub tokens_used: Option<u32>,
    /// Round-trip latency in milliseconds
    pub latency_ms: u64,
}

/// Trait that all LLM providers implement.
///
/// Uses `async_trait` because native async fn in trait is not object-safe
/// (we need `Box<dyn LlmProvider>` for dynamic dispatch).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name for logging (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Check whether the provider is configured and reachable.
    async fn is_available(&self) -> bool;

    /// Send one request and return the generated text.
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, PipelineError>;

    /// Per-request timeout for this provider.
    fn timeout(&self) -> Duration;
}

/// Resolve `${ENV_VAR}` references in config strings.
pub fn resolve_env_var(value: &str) -> Option<String> {
    if value.starts_with("${") && value.ends_with('}') {
        let var_name = &value[2..value.len() - 1];
        std::env::var(var_name).ok()
    } else if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Map a failed request send to a pipeline error.
///
/// Timeouts keep their own variant; everything else is a status-less
/// transport failure.
pub(crate) fn send_error(
    provider: &str,
    err: reqwest::Error,
    timeout: Duration,
) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout {
            stage: format!("{provider} request"),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        PipelineError::Llm {
            message: format!("{provider} request failed: {err}"),
            status_code: None,
        }
    }
}

/// Factory that creates the configured provider.
pub struct LlmProviderFactory;

impl LlmProviderFactory {
    /// Provider identifiers accepted by [`LlmProviderFactory::create`].
    pub const PROVIDERS: &'static [&'static str] = &["openai", "ollama"];

    /// Create the provider named by `config.provider`.
    pub fn create(config: &LlmConfig) -> Result<Box<dyn LlmProvider>, PipelineError> {
        match config.provider.as_str() {
            "openai" => {
                let cfg = &config.openai;
                let api_key = resolve_env_var(&cfg.api_key).ok_or_else(|| PipelineError::Llm {
                    message: "OpenAI API key not set. Set OPENAI_API_KEY env var.".to_string(),
                    status_code: None,
                })?;
                Ok(Box::new(super::openai::OpenAiProvider::with_endpoint(
                    &api_key,
                    &cfg.endpoint,
                    Duration::from_millis(cfg.timeout_ms),
                )))
            }
            "ollama" => {
                let cfg = &config.ollama;
                Ok(Box::new(super::ollama::OllamaProvider::new(
                    &cfg.endpoint,
                    Duration::from_millis(cfg.timeout_ms),
                )))
            }
            other => Err(PipelineError::Llm {
                message: format!(
                    "Unknown LLM provider: {other} (expected one of: {})",
                    Self::PROVIDERS.join(", ")
                ),
                status_code: None,
            }),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Local endpoint that accepts connections and never answers.
    pub(crate) async fn silent_endpoint() -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_image_input_from_bytes_jpeg() {
        let input = ImageInput::from_bytes(&[0xFF, 0xD8, 0xFF], "jpeg");
        assert_eq!(input.media_type, "image/jpeg");
        assert!(!input.data.is_empty());
    }

    #[test]
    fn test_image_input_from_bytes_uppercase_png() {
        let input = ImageInput::from_bytes(&[0x89, 0x50, 0x4E, 0x47], "PNG");
        assert_eq!(input.media_type, "image/png");
    }

    #[test]
    fn test_image_input_data_url() {
        let input = ImageInput::from_bytes(&[1, 2, 3], "jpeg");
        assert_eq!(input.data_url(), "data:image/jpeg;base64,AQID");
    }

    #[test]
    fn test_resolve_env_var() {
        // Non-env-var strings pass through
        assert_eq!(resolve_env_var("plain-key"), Some("plain-key".to_string()));
        // Empty returns None
        assert_eq!(resolve_env_var(""), None);
        // Unset env var returns None
        assert_eq!(resolve_env_var("${DEFINITELY_NOT_SET_XYZ_123}"), None);
    }

    #[test]
    fn test_factory_rejects_unknown_provider() {
        let config = LlmConfig {
            provider: "anthropic".to_string(),
            ..LlmConfig::default()
        };
        let err = LlmProviderFactory::create(&config).err().unwrap();
        assert!(err.to_string().contains("Unknown LLM provider"));
    }

    #[test]
    fn test_factory_creates_ollama() {
        let config = LlmConfig {
            provider: "ollama".to_string(),
            ..LlmConfig::default()
        };
        let provider = LlmProviderFactory::create(&config).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn test_factory_openai_with_literal_key() {
        let mut config = LlmConfig::default();
        config.openai.api_key = "sk-test".to_string();
        let provider = LlmProviderFactory::create(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}

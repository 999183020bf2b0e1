//! Ollama LLM provider for local vision model inference.
//!
//! Talks to a local Ollama instance via its `/api/chat` endpoint.
//! No authentication required, just needs Ollama running locally.
//! A response schema, when present, is passed as the `format` constraint.

use super::provider::{send_error, LlmProvider, LlmRequest, LlmResponse};
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// Ollama provider for local vision model inference.
pub struct OllamaProvider {
    endpoint: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

/// Ollama /api/chat request body.
#[derive(Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<Value>,
    options: OllamaOptions,
}

#[derive(Serialize)]
struct OllamaMessage {
    role: String,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<String>,
}

#[derive(Serialize)]
struct OllamaOptions {
    num_predict: u32,
}

/// Ollama /api/chat response.
#[derive(Deserialize)]
struct OllamaResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaResponseMessage {
    content: String,
}

fn build_body(request: &LlmRequest) -> OllamaRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(OllamaMessage {
            role: "system".to_string(),
            content: system.clone(),
            images: Vec::new(),
        });
    }
    messages.push(OllamaMessage {
        role: "user".to_string(),
        content: request.instruction.clone(),
        images: vec![request.image.data.clone()],
    });

    OllamaRequest {
        model: request.model.clone(),
        messages,
        stream: false,
        format: request.response_schema.as_ref().map(|s| s.schema.clone()),
        options: OllamaOptions {
            num_predict: request.max_tokens,
        },
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.endpoint);
        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, PipelineError> {
        let url = format!("{}/api/chat", self.endpoint);
        let start = Instant::now();
        let body = build_body(request);

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| send_error("Ollama", e, self.timeout()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Llm {
                message: format!("Ollama HTTP {status}: {text}"),
                status_code: Some(status.as_u16()),
            });
        }

        let ollama_resp: OllamaResponse =
            resp.json().await.map_err(|e| PipelineError::Llm {
                message: format!("Failed to parse Ollama response: {e}"),
                status_code: None,
            })?;

        let text = ollama_resp.message.content.trim().to_string();
        if text.is_empty() {
            return Err(PipelineError::Llm {
                message: "Ollama returned empty response, no content generated".to_string(),
                status_code: None,
            });
        }

        let tokens_used = match (ollama_resp.prompt_eval_count, ollama_resp.eval_count) {
            (None, None) => None,
            (prompt, eval) => Some(prompt.unwrap_or(0) + eval.unwrap_or(0)),
        };

        Ok(LlmResponse {
            text,
            model: request.model.clone(),
            tokens_used,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

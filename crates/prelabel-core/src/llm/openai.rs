//! OpenAI LLM provider using the Chat Completions API.
//!
//! Sends the image via data URL in the user message content array. When the
//! request carries a response schema it is attached as a strict
//! `json_schema` response format.

use super::provider::{send_error, LlmProvider, LlmRequest, LlmResponse};
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};

/// OpenAI provider using Chat Completions API.
pub struct OpenAiProvider {
    api_key: String,
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiProvider {
    /// Create with a custom endpoint (any OpenAI-compatible server).
    pub fn with_endpoint(api_key: &str, endpoint: &str, timeout: Duration) -> Self {
        Self {
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
            endpoint: endpoint.to_string(),
            timeout,
        }
    }
}

// --- Request types ---

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: String,
    content: MessageContent,
}

#[derive(Serialize)]
#[serde(untagged)]
enum MessageContent {
    Text(String),
    Parts(Vec<ChatContent>),
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ChatContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat,
}

#[derive(Serialize)]
struct JsonSchemaFormat {
    name: String,
    strict: bool,
    schema: Value,
}

// --- Response types ---

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    model: String,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

fn build_body(request: &LlmRequest) -> ChatRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: MessageContent::Text(system.clone()),
        });
    }
    messages.push(ChatMessage {
        role: "user".to_string(),
        content: MessageContent::Parts(vec![
            ChatContent::Text {
                text: request.instruction.clone(),
            },
            ChatContent::ImageUrl {
                image_url: ImageUrl {
                    url: request.image.data_url(),
                },
            },
        ]),
    });

    ChatRequest {
        model: request.model.clone(),
        messages,
        max_tokens: request.max_tokens,
        response_format: request.response_schema.as_ref().map(|s| ResponseFormat {
            kind: "json_schema",
            json_schema: JsonSchemaFormat {
                name: s.name.clone(),
                strict: true,
                schema: s.schema.clone(),
            },
        }),
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn is_available(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, PipelineError> {
        let start = Instant::now();
        let body = build_body(request);

        let resp = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .timeout(self.timeout())
            .send()
            .await
            .map_err(|e| send_error("OpenAI", e, self.timeout()))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(PipelineError::Llm {
                message: format!("OpenAI HTTP {status}: {text}"),
                status_code: Some(status.as_u16()),
            });
        }

        let chat_resp: ChatResponse = resp.json().await.map_err(|e| PipelineError::Llm {
            message: format!("Failed to parse OpenAI response: {e}"),
            status_code: None,
        })?;

        let message = chat_resp
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| PipelineError::Llm {
                message: "OpenAI returned empty choices array, no content generated".to_string(),
                status_code: None,
            })?;

        if let Some(refusal) = message.refusal {
            return Err(PipelineError::Refused(refusal));
        }

        let text = message.content.ok_or_else(|| PipelineError::Llm {
            message: "OpenAI returned a message without content".to_string(),
            status_code: None,
        })?;

        Ok(LlmResponse {
            text: text.trim().to_string(),
            model: chat_resp.model,
            tokens_used: chat_resp.usage.map(|u| u.total_tokens),
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{ImageInput, ResponseSchema};

    fn request(system: Option<&str>, schema: Option<Value>) -> LlmRequest {
        LlmRequest {
            image: ImageInput::from_bytes(&[1, 2, 3], "png"),
            instruction: "Classify this shoe.".to_string(),
            system: system.map(String::from),
            response_schema: schema.map(|schema| ResponseSchema {
                name: "shoe_attributes".to_string(),
                schema,
            }),
            model: "gpt-4o".to_string(),
            max_tokens: 500,
        }
    }

    #[test]
    fn test_body_without_system_or_schema() {
        let body = serde_json::to_value(build_body(&request(None, None))).unwrap();
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["content"][0]["type"], "text");
        assert_eq!(
            body["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/png;base64,AQID"
        );
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_body_with_system_and_schema() {
        let schema = serde_json::json!({"type": "object"});
        let body = serde_json::to_value(build_body(&request(Some("Be exact."), Some(schema))))
            .unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be exact.");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert_eq!(body["response_format"]["json_schema"]["name"], "shoe_attributes");
    }

    #[test]
    fn test_refusal_field_deserializes() {
        let resp: ChatResponse = serde_json::from_str(
            r#"{"model":"gpt-4o","choices":[{"message":{"content":null,"refusal":"no"}}]}"#,
        )
        .unwrap();
        assert_eq!(resp.choices[0].message.refusal.as_deref(), Some("no"));
        assert!(resp.usage.is_none());
    }

    #[tokio::test]
    async fn test_missing_api_key_is_unavailable() {
        let endpoint = "http://127.0.0.1:1/v1/chat/completions";
        let timeout = Duration::from_secs(1);
        assert!(!OpenAiProvider::with_endpoint("", endpoint, timeout).is_available().await);
        assert!(OpenAiProvider::with_endpoint("sk-test", endpoint, timeout).is_available().await);
    }
}

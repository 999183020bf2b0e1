//! Label Studio REST client.
//!
//! Authenticates with a legacy access token (`Authorization: Token <key>`).

use super::{Task, TaskDetail, TaskStore};
use crate::config::LabelStudioConfig;
use crate::error::StoreError;
use crate::llm::resolve_env_var;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// HTTP client for one Label Studio project.
pub struct LabelStudioClient {
    base_url: String,
    api_key: String,
    project_id: u64,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct CreatePrediction<'a> {
    task: u64,
    result: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_version: Option<&'a str>,
}

impl LabelStudioClient {
    pub fn new(base_url: &str, api_key: &str, project_id: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            project_id,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(config: &LabelStudioConfig) -> Result<Self, StoreError> {
        let api_key = resolve_env_var(&config.api_key).ok_or_else(|| StoreError::Http {
            message: "Label Studio API key not set. Set LABEL_STUDIO_API_KEY env var.".to_string(),
            status_code: None,
        })?;
        Ok(Self::new(&config.url, &api_key, config.project_id))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn tasks_url(&self) -> String {
        self.url(&format!(
            "/api/projects/{}/tasks/?page_size=-1",
            self.project_id
        ))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let resp = request
            .header("Authorization", format!("Token {}", self.api_key))
            .timeout(Duration::from_secs(30))
            .send()
            .await
            .map_err(|e| StoreError::Http {
                message: format!("Label Studio {what} failed: {e}"),
                status_code: None,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(StoreError::Http {
                message: format!("Label Studio {what} HTTP {status}: {text}"),
                status_code: Some(status.as_u16()),
            });
        }
        Ok(resp)
    }
}

/// Task listings come back either as a bare array or wrapped in `{"tasks": [...]}`.
fn decode_task_list(body: Value) -> Result<Vec<Task>, StoreError> {
    let tasks = match body {
        Value::Array(items) => Value::Array(items),
        Value::Object(mut object) => object
            .remove("tasks")
            .ok_or_else(|| StoreError::Decode("task listing has no 'tasks' field".to_string()))?,
        other => {
            return Err(StoreError::Decode(format!(
                "unexpected task listing: {other}"
            )))
        }
    };
    serde_json::from_value(tasks).map_err(|e| StoreError::Decode(e.to_string()))
}

#[async_trait]
impl TaskStore for LabelStudioClient {
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
        let resp = self
            .send(self.client.get(self.tasks_url()), "task listing")
            .await?;
        let body: Value = resp
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))?;
        let tasks = decode_task_list(body)?;
        tracing::debug!(
            "Listed {} task(s) in project {}",
            tasks.len(),
            self.project_id
        );
        Ok(tasks)
    }

    async fn get_task(&self, id: u64) -> Result<TaskDetail, StoreError> {
        let resp = self
            .send(
                self.client.get(self.url(&format!("/api/tasks/{id}"))),
                "task lookup",
            )
            .await?;
        resp.json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }

    async fn create_prediction(
        &self,
        task_id: u64,
        result: Value,
        model_version: Option<&str>,
    ) -> Result<(), StoreError> {
        let body = CreatePrediction {
            task: task_id,
            result,
            model_version,
        };
        self.send(
            self.client.post(self.url("/api/predictions/")).json(&body),
            "prediction create",
        )
        .await?;
        Ok(())
    }

    async fn update_prediction(
        &self,
        prediction_id: u64,
        payload: Value,
    ) -> Result<(), StoreError> {
        self.send(
            self.client
                .patch(self.url(&format!("/api/predictions/{prediction_id}/")))
                .json(&payload),
            "prediction update",
        )
        .await?;
        Ok(())
    }
}

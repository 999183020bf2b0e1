//! Task store abstraction.
//!
//! The annotation server is consumed through [`TaskStore`]: list tasks in a
//! stable order, look up a task's existing predictions, create or update a
//! prediction. [`LabelStudioClient`] is the HTTP implementation.

mod images;
mod label_studio;

pub use images::{strip_upload_prefix, ImageLocation, ImageResolver, UPLOAD_PREFIX_LEN};
pub use label_studio::LabelStudioClient;

use crate::error::StoreError;
use crate::template::FilledPrediction;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One unit of annotatable work as listed by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: u64,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// Task details needed to decide between create and update.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskDetail {
    #[serde(default)]
    pub id: u64,
    /// Existing predictions, either full objects or bare ids
    #[serde(default)]
    pub predictions: Vec<Value>,
}

impl TaskDetail {
    /// Id of the first existing prediction, if any.
    pub fn first_prediction_id(&self) -> Option<u64> {
        self.predictions.first().and_then(|p| match p {
            Value::Number(n) => n.as_u64(),
            Value::Object(o) => o.get("id").and_then(Value::as_u64),
            _ => None,
        })
    }
}

/// Operations the pipeline needs from the annotation server.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// All tasks of the configured project, in server order.
    async fn list_tasks(&self) -> Result<Vec<Task>, StoreError>;

    async fn get_task(&self, id: u64) -> Result<TaskDetail, StoreError>;

    async fn create_prediction(
        &self,
        task_id: u64,
        result: Value,
        model_version: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn update_prediction(&self, prediction_id: u64, payload: Value) -> Result<(), StoreError>;
}

/// What [`upsert_prediction`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upload {
    Created,
    Updated(u64),
}

/// Create a prediction for a task that has none, otherwise update its first
/// existing prediction. Never creates a second prediction for a task.
pub async fn upsert_prediction(
    store: &dyn TaskStore,
    task_id: u64,
    prediction: &FilledPrediction,
) -> Result<Upload, StoreError> {
    let detail = store.get_task(task_id).await?;
    match detail.first_prediction_id() {
        None => {
            let result = prediction.result_value()?;
            store
                .create_prediction(task_id, result, prediction.model_version())
                .await?;
            Ok(Upload::Created)
        }
        Some(prediction_id) => {
            let payload = prediction.payload()?;
            store.update_prediction(prediction_id, payload).await?;
            Ok(Upload::Updated(prediction_id))
        }
    }
}

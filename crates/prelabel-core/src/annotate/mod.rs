//! Batch annotation of task store tasks.
//!
//! Tasks are processed one at a time in the order the store lists them.
//! Every task gets its own retry budget and its own copy of the result
//! template; a task that fails (unresolvable image, rejected request,
//! exhausted retries, failed upload) is logged, counted, and skipped.

mod controller;
mod executor;

pub use controller::{RetryController, RetryOutcome, RetryPolicy};
pub use executor::{Attempt, QueryExecutor};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult, PrelabelError, StoreError};
use crate::llm::LlmProvider;
use crate::prompt::{PromptStrategy, StrategyKind};
use crate::store::{upsert_prediction, ImageResolver, Task, TaskStore, Upload};
use crate::template::{FilledPrediction, ResultTemplate};
use serde::Serialize;

/// Run-level options.
#[derive(Debug, Clone, Default)]
pub struct AnnotateOptions {
    pub retry: RetryPolicy,
    /// Annotate at most this many tasks (0 = all)
    pub limit: usize,
    /// Query and parse, but do not write to the task store
    pub dry_run: bool,
}

impl AnnotateOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            retry: RetryPolicy {
                max_attempts: config.max_retries,
                base_delay_ms: config.retry_delay_ms,
            },
            limit: config.limit,
            dry_run: false,
        }
    }
}

/// What happened to one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Created,
    Updated(u64),
    DryRun,
    Unresolved,
    Fatal,
    Exhausted,
    UploadFailed,
}

/// Per-task report handed to the caller's callback.
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task_id: u64,
    pub outcome: TaskOutcome,
    /// Model attempts made (0 when the image could not be resolved)
    pub attempts: u32,
    pub prediction: Option<FilledPrediction>,
}

/// Counts per outcome for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub created: usize,
    pub updated: usize,
    pub dry_run: usize,
    pub unresolved: usize,
    pub fatal: usize,
    pub exhausted: usize,
    pub upload_failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: TaskOutcome) {
        self.total += 1;
        match outcome {
            TaskOutcome::Created => self.created += 1,
            TaskOutcome::Updated(_) => self.updated += 1,
            TaskOutcome::DryRun => self.dry_run += 1,
            TaskOutcome::Unresolved => self.unresolved += 1,
            TaskOutcome::Fatal => self.fatal += 1,
            TaskOutcome::Exhausted => self.exhausted += 1,
            TaskOutcome::UploadFailed => self.upload_failed += 1,
        }
    }

    /// Tasks that produced a prediction.
    pub fn annotated(&self) -> usize {
        self.created + self.updated + self.dry_run
    }

    pub fn skipped(&self) -> usize {
        self.total - self.annotated()
    }
}

/// Sequential annotation driver.
pub struct Annotator {
    provider: Box<dyn LlmProvider>,
    store: Box<dyn TaskStore>,
    resolver: ImageResolver,
    strategy: PromptStrategy,
    template: ResultTemplate,
    controller: RetryController,
    options: AnnotateOptions,
}

impl Annotator {
    pub fn new(
        provider: Box<dyn LlmProvider>,
        store: Box<dyn TaskStore>,
        resolver: ImageResolver,
        strategy: PromptStrategy,
        template: ResultTemplate,
        options: AnnotateOptions,
    ) -> Self {
        Self {
            provider,
            store,
            resolver,
            strategy,
            template,
            controller: RetryController::new(options.retry.clone()),
            options,
        }
    }

    pub fn strategy(&self) -> &PromptStrategy {
        &self.strategy
    }

    /// Tasks this run will process, in store order, capped by `limit`.
    pub async fn tasks(&self) -> Result<Vec<Task>, StoreError> {
        let mut tasks = self.store.list_tasks().await?;
        if self.options.limit > 0 && tasks.len() > self.options.limit {
            tasks.truncate(self.options.limit);
        }
        Ok(tasks)
    }

    /// Fail fast when the model endpoint is not usable. The null strategy
    /// never queries it, so it is not checked.
    pub async fn check_provider(&self) -> PipelineResult<()> {
        if self.strategy.kind() == StrategyKind::Null || self.provider.is_available().await {
            return Ok(());
        }
        Err(PipelineError::Llm {
            message: format!(
                "{} provider is not available, check its endpoint and credentials",
                self.provider.name()
            ),
            status_code: None,
        })
    }

    /// Check the provider, list tasks and annotate all of them.
    ///
    /// Only an unavailable provider or a failure to list tasks is returned
    /// as an error.
    pub async fn run<F>(&self, on_task: F) -> Result<RunSummary, PrelabelError>
    where
        F: FnMut(&TaskReport),
    {
        self.check_provider().await?;
        let tasks = self.tasks().await?;
        tracing::info!(
            "Annotating {} task(s) with strategy {}",
            tasks.len(),
            self.strategy.kind()
        );
        Ok(self.run_tasks(&tasks, on_task).await)
    }

    /// Annotate the given tasks in order.
    pub async fn run_tasks<F>(&self, tasks: &[Task], mut on_task: F) -> RunSummary
    where
        F: FnMut(&TaskReport),
    {
        let mut summary = RunSummary::default();
        for (index, task) in tasks.iter().enumerate() {
            let report = self.annotate_task(task, index == 0).await;
            summary.record(report.outcome);
            on_task(&report);
        }
        summary
    }

    /// Annotate one task. Never fails: every failure becomes an outcome.
    pub async fn annotate_task(&self, task: &Task, log_details: bool) -> TaskReport {
        let report = |outcome, attempts, prediction| TaskReport {
            task_id: task.id,
            outcome,
            attempts,
            prediction,
        };

        let image = match self.resolver.locate(task) {
            Ok(location) => match self.resolver.load(&location).await {
                Ok(image) => image,
                Err(e) => {
                    tracing::error!(task_id = task.id, "Skipping task: {e}");
                    return report(TaskOutcome::Unresolved, 0, None);
                }
            },
            Err(e) => {
                tracing::error!(task_id = task.id, "Skipping task: {e}");
                return report(TaskOutcome::Unresolved, 0, None);
            }
        };

        let executor = QueryExecutor::new(self.provider.as_ref(), &self.strategy, &self.template);
        let subject = format!("task {}", task.id);
        let outcome = self
            .controller
            .run(&subject, |_| executor.execute(&image))
            .await;

        let (attempt, attempts) = match outcome {
            RetryOutcome::Parsed {
                value,
                failed_attempts,
            } => (value, failed_attempts + 1),
            RetryOutcome::Fatal { attempts, .. } => {
                return report(TaskOutcome::Fatal, attempts, None);
            }
            RetryOutcome::Exhausted { attempts, .. } => {
                return report(TaskOutcome::Exhausted, attempts, None);
            }
        };

        if log_details {
            tracing::debug!("Output: {}", attempt.raw);
            tracing::debug!(
                "Prediction: {}",
                serde_json::to_string(&attempt.prediction).unwrap_or_default()
            );
            tracing::debug!("Model: {}", self.strategy.model());
            tracing::debug!("Origin: {}", self.strategy.origin());
        }

        if self.options.dry_run {
            return report(TaskOutcome::DryRun, attempts, Some(attempt.prediction));
        }

        match upsert_prediction(self.store.as_ref(), task.id, &attempt.prediction).await {
            Ok(Upload::Created) => {
                tracing::info!(task_id = task.id, attempts, "Created prediction");
                report(TaskOutcome::Created, attempts, Some(attempt.prediction))
            }
            Ok(Upload::Updated(prediction_id)) => {
                tracing::info!(task_id = task.id, attempts, prediction_id, "Updated prediction");
                report(
                    TaskOutcome::Updated(prediction_id),
                    attempts,
                    Some(attempt.prediction),
                )
            }
            Err(e) => {
                tracing::error!(task_id = task.id, "Failed to upload prediction: {e}");
                report(TaskOutcome::UploadFailed, attempts, Some(attempt.prediction))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::ImageMode;
    use crate::llm::{LlmRequest, LlmResponse};
    use crate::schema::AttributeSchema;
    use crate::store::tests::{task, MemoryStore};
    use crate::template::tests::footwear_template;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    pub(crate) const VALID_ANSWER: &str = r#"{"Function":["Running","Hiking"],"Type":["Sneakers"],"Main Color":["Pastels"],"Sub Color":["Monochrome"],"Upper Structure":["One-Piece Upper"],"Closure Type":["Shoelace"],"Toe Shape":["Round"],"Heel Type":["Flat"]}"#;

    /// Provider whose answer for each call is produced by a script.
    pub(crate) struct ScriptedProvider {
        script: Box<dyn Fn(u32) -> Result<String, PipelineError> + Send + Sync>,
        pub calls: Arc<AtomicU32>,
        pub available: bool,
    }

    impl ScriptedProvider {
        pub(crate) fn new(
            script: impl Fn(u32) -> Result<String, PipelineError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                calls: Arc::new(AtomicU32::new(0)),
                available: true,
            }
        }

        pub(crate) fn always_valid() -> Self {
            Self::new(|_| Ok(VALID_ANSWER.to_string()))
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn is_available(&self) -> bool {
            self.available
        }

        async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, PipelineError> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            (self.script)(idx).map(|text| LlmResponse {
                text,
                model: request.model.clone(),
                tokens_used: Some(42),
                latency_ms: 10,
            })
        }

        fn timeout(&self) -> Duration {
            Duration::from_secs(60)
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        resolver: ImageResolver,
    }

    /// Local-mode resolver over a temp dir holding `a.jpg`, `b.jpg`, `c.jpg`.
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            std::fs::write(dir.path().join(name), [0xFF, 0xD8, 0xFF]).unwrap();
        }
        let resolver = ImageResolver::new(ImageMode::Local, "", dir.path(), "image");
        Fixture {
            _dir: dir,
            resolver,
        }
    }

    fn annotator(
        provider: ScriptedProvider,
        store: Arc<MemoryStore>,
        resolver: ImageResolver,
        options: AnnotateOptions,
    ) -> Annotator {
        let strategy = PromptStrategy::new(
            StrategyKind::MultiLabel,
            "gpt-4o-multi",
            "gpt-4o",
            Arc::new(AttributeSchema::footwear()),
        );
        Annotator::new(
            Box::new(provider),
            Box::new(SharedStore(store)),
            resolver,
            strategy,
            footwear_template(),
            options,
        )
    }

    /// Lets a test keep a handle on the store it hands to the annotator.
    struct SharedStore(Arc<MemoryStore>);

    #[async_trait]
    impl TaskStore for SharedStore {
        async fn list_tasks(&self) -> Result<Vec<Task>, StoreError> {
            self.0.list_tasks().await
        }
        async fn get_task(&self, id: u64) -> Result<crate::store::TaskDetail, StoreError> {
            self.0.get_task(id).await
        }
        async fn create_prediction(
            &self,
            task_id: u64,
            result: serde_json::Value,
            model_version: Option<&str>,
        ) -> Result<(), StoreError> {
            self.0.create_prediction(task_id, result, model_version).await
        }
        async fn update_prediction(
            &self,
            prediction_id: u64,
            payload: serde_json::Value,
        ) -> Result<(), StoreError> {
            self.0.update_prediction(prediction_id, payload).await
        }
    }

    fn three_tasks() -> Vec<Task> {
        vec![
            task(1, "/data/upload/1/00000001-a.jpg"),
            task(2, "/data/upload/1/00000002-b.jpg"),
            task(3, "/data/upload/1/00000003-c.jpg"),
        ]
    }

    #[tokio::test]
    async fn test_run_creates_predictions_in_order() {
        let fx = fixture();
        let store = Arc::new(MemoryStore::with_tasks(three_tasks()));
        let annotator = annotator(
            ScriptedProvider::always_valid(),
            store.clone(),
            fx.resolver,
            AnnotateOptions::default(),
        );

        let mut seen = Vec::new();
        let summary = annotator.run(|r| seen.push(r.task_id)).await.unwrap();

        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(summary.created, 3);
        assert_eq!(summary.annotated(), 3);
        let created = store.created.lock().unwrap();
        assert_eq!(created[0].1[0]["value"]["text"][0], "Running, Hiking");
        assert_eq!(created[0].1[0]["origin"], "gpt-4o-multi");
    }

    #[tokio::test]
    async fn test_existing_prediction_is_updated_not_duplicated() {
        let fx = fixture();
        let store = Arc::new(MemoryStore::with_tasks(three_tasks()));
        store.existing.lock().unwrap().insert(2, vec![77]);
        let annotator = annotator(
            ScriptedProvider::always_valid(),
            store.clone(),
            fx.resolver,
            AnnotateOptions::default(),
        );

        let summary = annotator.run(|_| {}).await.unwrap();
        assert_eq!(summary.created, 2);
        assert_eq!(summary.updated, 1);
        let updated = store.updated.lock().unwrap();
        assert_eq!(updated[0].0, 77);
        assert_eq!(updated[0].1["model_version"], "gpt-4o");
    }

    #[tokio::test]
    async fn test_one_task_failure_does_not_abort_batch() {
        let fx = fixture();
        let store = Arc::new(MemoryStore::with_tasks(three_tasks()));
        // Calls 0..2 serve task 1 (3 attempts, all garbage); later calls are valid.
        let provider = ScriptedProvider::new(|idx| {
            if idx < 3 {
                Ok("not json".to_string())
            } else {
                Ok(VALID_ANSWER.to_string())
            }
        });
        let calls = provider.calls.clone();
        let options = AnnotateOptions {
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 0,
            },
            ..AnnotateOptions::default()
        };
        let annotator = annotator(provider, store.clone(), fx.resolver, options);

        let mut outcomes = Vec::new();
        let summary = annotator.run(|r| outcomes.push((r.outcome, r.attempts))).await.unwrap();

        assert_eq!(outcomes[0], (TaskOutcome::Exhausted, 3));
        assert_eq!(outcomes[1], (TaskOutcome::Created, 1));
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.skipped(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_fatal_rejection_skips_task() {
        let fx = fixture();
        let store = Arc::new(MemoryStore::with_tasks(three_tasks()));
        let provider = ScriptedProvider::new(|idx| {
            if idx == 0 {
                Err(PipelineError::Refused("content policy".to_string()))
            } else {
                Ok(VALID_ANSWER.to_string())
            }
        });
        let calls = provider.calls.clone();
        let annotator = annotator(provider, store, fx.resolver, AnnotateOptions::default());

        let summary = annotator.run(|_| {}).await.unwrap();
        assert_eq!(summary.fatal, 1);
        assert_eq!(summary.created, 2);
        // One call for the refused task, one each for the others.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unresolved_image_skips_without_query() {
        let fx = fixture();
        let store = Arc::new(MemoryStore::with_tasks(vec![
            task(1, "/data/upload/1/00000009-missing.jpg"),
            task(2, "/data/upload/1/00000002-b.jpg"),
        ]));
        let provider = ScriptedProvider::always_valid();
        let calls = provider.calls.clone();
        let annotator = annotator(provider, store, fx.resolver, AnnotateOptions::default());

        let summary = annotator.run(|_| {}).await.unwrap();
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.created, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upload_failure_is_counted() {
        let fx = fixture();
        let mut store = MemoryStore::with_tasks(three_tasks());
        store.failing_writes = vec![3];
        let annotator = annotator(
            ScriptedProvider::always_valid(),
            Arc::new(store),
            fx.resolver,
            AnnotateOptions::default(),
        );

        let summary = annotator.run(|_| {}).await.unwrap();
        assert_eq!(summary.upload_failed, 1);
        assert_eq!(summary.created, 2);
    }

    #[tokio::test]
    async fn test_dry_run_and_limit() {
        let fx = fixture();
        let store = Arc::new(MemoryStore::with_tasks(three_tasks()));
        let options = AnnotateOptions {
            limit: 2,
            dry_run: true,
            ..AnnotateOptions::default()
        };
        let annotator = annotator(
            ScriptedProvider::always_valid(),
            store.clone(),
            fx.resolver,
            options,
        );

        let mut predictions = Vec::new();
        let summary = annotator
            .run(|r| predictions.extend(r.prediction.clone()))
            .await
            .unwrap();
        assert_eq!(summary.total, 2);
        assert_eq!(summary.dry_run, 2);
        assert_eq!(predictions.len(), 2);
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_provider_stops_run_before_any_task() {
        let fx = fixture();
        let store = Arc::new(MemoryStore::with_tasks(three_tasks()));
        let mut provider = ScriptedProvider::always_valid();
        provider.available = false;
        let calls = provider.calls.clone();
        let annotator = annotator(
            provider,
            store.clone(),
            fx.resolver,
            AnnotateOptions::default(),
        );

        let err = annotator.run(|_| {}).await.unwrap_err();
        assert!(err.to_string().contains("scripted provider is not available"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.created.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_null_strategy_skips_provider_check() {
        let fx = fixture();
        let mut provider = ScriptedProvider::always_valid();
        provider.available = false;
        let strategy = PromptStrategy::new(
            StrategyKind::Null,
            "null",
            "gpt-4o",
            Arc::new(AttributeSchema::footwear()),
        );
        let annotator = Annotator::new(
            Box::new(provider),
            Box::new(SharedStore(Arc::new(MemoryStore::default()))),
            fx.resolver,
            strategy,
            footwear_template(),
            AnnotateOptions::default(),
        );

        assert!(annotator.check_provider().await.is_ok());
    }

    #[test]
    fn test_options_from_config() {
        let config = PipelineConfig {
            max_retries: 7,
            retry_delay_ms: 250,
            limit: 5,
            ..PipelineConfig::default()
        };
        let options = AnnotateOptions::from_config(&config);
        assert_eq!(options.retry.max_attempts, 7);
        assert_eq!(options.retry.base_delay_ms, 250);
        assert_eq!(options.limit, 5);
        assert!(!options.dry_run);
    }
}

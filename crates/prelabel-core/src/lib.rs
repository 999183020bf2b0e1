//! Prelabel Core - vision-model pre-annotation for Label Studio.
//!
//! Prelabel asks a vision-capable language model to classify each task image
//! against a fixed attribute taxonomy, fills the project's prediction template
//! with the answer, and uploads it as a prediction. A separate offline job
//! flattens an export into a prediction-vs-annotation comparison table.
//!
//! # Architecture
//!
//! ```text
//! Task → Image → PromptStrategy.query → raw text → ResponseParser
//!      → AttributeMapping → ResultMerger → FilledPrediction → TaskStore
//!
//! Export → AnnotationFlattener → FlatRecord → CSV / JSON
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use prelabel_core::{Config, Prelabel};
//!
//! #[tokio::main]
//! async fn main() -> prelabel_core::Result<()> {
//!     let config = Config::load()?;
//!     let annotator = Prelabel::new(config).annotator()?;
//!     let summary = annotator.run(|_| {}).await?;
//!     println!("Annotated {} task(s)", summary.annotated());
//!     Ok(())
//! }
//! ```

pub mod annotate;
pub mod config;
pub mod error;
pub mod flatten;
pub mod llm;
pub mod output;
pub mod prompt;
pub mod schema;
pub mod store;
pub mod template;
pub mod types;

pub use annotate::{AnnotateOptions, Annotator, RunSummary, TaskOutcome, TaskReport};
pub use config::Config;
pub use error::{
    ConfigError, FlattenError, PipelineError, PipelineResult, PrelabelError, Result, StoreError,
};
pub use flatten::{AnnotationFlattener, ConvertOptions, ConvertReport, FlatRecord};
pub use output::{OutputFormat, OutputWriter};
pub use prompt::{PromptStrategy, StrategyKind};
pub use schema::{AttributeSchema, Cardinality};
pub use template::{FilledPrediction, ResultTemplate};
pub use types::{AttributeMapping, LabelValue, Provenance};

use llm::LlmProviderFactory;
use std::sync::Arc;
use store::{ImageResolver, LabelStudioClient};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point that wires configuration into the pipeline components.
pub struct Prelabel {
    config: Config,
    schema: Arc<AttributeSchema>,
}

impl Prelabel {
    pub fn new(config: Config) -> Self {
        tracing::debug!("Initializing Prelabel v{}", VERSION);
        Self {
            config,
            schema: Arc::new(AttributeSchema::footwear()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Strategy selected by `[prompt]`.
    pub fn strategy(&self) -> PipelineResult<PromptStrategy> {
        Ok(
            PromptStrategy::from_config(&self.config.prompt, self.schema.clone())?
                .with_max_tokens(self.config.llm.max_tokens),
        )
    }

    /// Build a batch annotator against the configured Label Studio project.
    pub fn annotator(&self) -> Result<Annotator> {
        self.annotator_with(AnnotateOptions::from_config(&self.config.pipeline))
    }

    pub fn annotator_with(&self, options: AnnotateOptions) -> Result<Annotator> {
        let strategy = self.strategy()?;
        let provider = LlmProviderFactory::create(&self.config.llm)?;
        let store = LabelStudioClient::from_config(&self.config.label_studio)?;
        let template = ResultTemplate::load(&self.config.template_path())?;
        tracing::info!(
            "Strategy {} (origin {}, model {}) via {}",
            strategy.kind(),
            strategy.origin(),
            strategy.model(),
            provider.name()
        );
        Ok(Annotator::new(
            provider,
            Box::new(store),
            ImageResolver::from_config(&self.config),
            strategy,
            template,
            options,
        ))
    }

    /// Flattener using the configured image data key.
    pub fn flattener(&self) -> AnnotationFlattener {
        AnnotationFlattener::new(&self.schema, &self.config.images.data_key)
    }
}

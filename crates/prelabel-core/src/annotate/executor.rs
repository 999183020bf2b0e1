//! One annotation attempt: query the model, parse the answer into a filled
//! template.

use crate::error::PipelineResult;
use crate::llm::{ImageInput, LlmProvider};
use crate::prompt::PromptStrategy;
use crate::template::{FilledPrediction, ResultTemplate};

/// Successful attempt output.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// Raw model text (kept for debug logging only)
    pub raw: String,
    pub prediction: FilledPrediction,
}

/// Binds a provider, a strategy and the template skeleton for a run.
pub struct QueryExecutor<'a> {
    provider: &'a dyn LlmProvider,
    strategy: &'a PromptStrategy,
    template: &'a ResultTemplate,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(
        provider: &'a dyn LlmProvider,
        strategy: &'a PromptStrategy,
        template: &'a ResultTemplate,
    ) -> Self {
        Self {
            provider,
            strategy,
            template,
        }
    }

    /// Send one request and parse the answer.
    ///
    /// Errors are returned unclassified; the retry controller decides
    /// whether they end the task.
    pub async fn execute(&self, image: &ImageInput) -> PipelineResult<Attempt> {
        let raw = self.strategy.query(self.provider, image).await?;
        let prediction = self.strategy.parse(&raw, self.template)?;
        Ok(Attempt { raw, prediction })
    }
}

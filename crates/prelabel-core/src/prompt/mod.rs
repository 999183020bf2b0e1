//! Prompt strategies.
//!
//! A strategy bundles how a model is asked (instruction, optional system
//! text, optional strict response schema) with how its answer is read back
//! (the matching [`ResponseParser`]). The set of strategies is closed and
//! selected from configuration by identifier.

mod instructions;
mod parser;

pub use instructions::{fenced_json_instruction, response_schema, RESPONSE_SCHEMA_NAME};
pub use parser::{strip_outer_lines, validate, ResponseParser};

use crate::config::PromptConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::llm::{ImageInput, LlmProvider, LlmRequest};
use crate::schema::AttributeSchema;
use crate::template::{FilledPrediction, ResultMerger, ResultTemplate};
use crate::types::Provenance;
use std::str::FromStr;
use std::sync::Arc;

/// Text returned by the null strategy in place of a model answer.
pub const NULL_RESPONSE: &str = "This is for testing purposes only.";

/// Strategy identifiers accepted in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// Free-text prompt, fenced JSON answer, name-based slot filling
    FencedJson,
    /// Strict schema, one label per attribute, positional slot filling
    SingleLabel,
    /// Strict schema, label arrays per attribute, positional slot filling
    MultiLabel,
    /// No network call, template returned unchanged
    Null,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 4] = [
        StrategyKind::FencedJson,
        StrategyKind::SingleLabel,
        StrategyKind::MultiLabel,
        StrategyKind::Null,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            StrategyKind::FencedJson => "fenced_json",
            StrategyKind::SingleLabel => "single_label",
            StrategyKind::MultiLabel => "multi_label",
            StrategyKind::Null => "null",
        }
    }

    pub fn ids() -> Vec<&'static str> {
        Self::ALL.iter().map(StrategyKind::id).collect()
    }

    pub fn description(&self) -> &'static str {
        match self {
            StrategyKind::FencedJson => "free-text prompt, fenced JSON answer, slots by name",
            StrategyKind::SingleLabel => "strict JSON schema, one label per attribute",
            StrategyKind::MultiLabel => "strict JSON schema, label lists per attribute",
            StrategyKind::Null => "no model call, template passed through (pipeline testing)",
        }
    }

    /// Parser bound to this strategy (`None` for the null strategy).
    pub fn parser(&self) -> Option<ResponseParser> {
        match self {
            StrategyKind::FencedJson => Some(ResponseParser::FencedJson),
            StrategyKind::SingleLabel => Some(ResponseParser::SingleLabel),
            StrategyKind::MultiLabel => Some(ResponseParser::MultiLabel),
            StrategyKind::Null => None,
        }
    }
}

impl FromStr for StrategyKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.id() == s)
            .ok_or_else(|| PipelineError::UnknownStrategy(s.to_string()))
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// A configured strategy: kind plus the two free parameters `origin` and `model`.
#[derive(Debug, Clone)]
pub struct PromptStrategy {
    kind: StrategyKind,
    provenance: Provenance,
    schema: Arc<AttributeSchema>,
    max_tokens: u32,
}

impl PromptStrategy {
    pub fn new(
        kind: StrategyKind,
        origin: &str,
        model: &str,
        schema: Arc<AttributeSchema>,
    ) -> Self {
        Self {
            kind,
            provenance: Provenance::new(origin, model),
            schema,
            max_tokens: 1000,
        }
    }

    /// Build the strategy named in configuration.
    pub fn from_config(
        config: &PromptConfig,
        schema: Arc<AttributeSchema>,
    ) -> PipelineResult<Self> {
        let kind: StrategyKind = config.strategy.parse()?;
        Ok(Self::new(kind, &config.origin, &config.model, schema))
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn kind(&self) -> StrategyKind {
        self.kind
    }

    pub fn origin(&self) -> &str {
        &self.provenance.origin
    }

    pub fn model(&self) -> &str {
        &self.provenance.model
    }

    pub fn schema(&self) -> &AttributeSchema {
        &self.schema
    }

    /// Build the request for one attempt.
    pub fn request(&self, image: &ImageInput) -> LlmRequest {
        let (instruction, system, response_schema) = match self.kind {
            StrategyKind::FencedJson | StrategyKind::Null => {
                (fenced_json_instruction(&self.schema), None, None)
            }
            StrategyKind::SingleLabel | StrategyKind::MultiLabel => {
                let multi = self.kind == StrategyKind::MultiLabel;
                (
                    instructions::structured_instruction(multi),
                    Some(instructions::structured_system_text()),
                    Some(response_schema(&self.schema, multi)),
                )
            }
        };

        LlmRequest {
            image: image.clone(),
            instruction,
            system,
            response_schema,
            model: self.provenance.model.clone(),
            max_tokens: self.max_tokens,
        }
    }

    /// Issue one query and return the raw model text.
    pub async fn query(
        &self,
        provider: &dyn LlmProvider,
        image: &ImageInput,
    ) -> PipelineResult<String> {
        if self.kind == StrategyKind::Null {
            return Ok(NULL_RESPONSE.to_string());
        }
        let request = self.request(image);
        let response = provider.generate(&request).await?;
        tracing::trace!(
            "{} answered in {}ms ({:?} tokens)",
            response.model,
            response.latency_ms,
            response.tokens_used
        );
        Ok(response.text)
    }

    /// Parse a raw answer into a filled copy of `template`.
    pub fn parse(&self, raw: &str, template: &ResultTemplate) -> PipelineResult<FilledPrediction> {
        let Some(parser) = self.kind.parser() else {
            return Ok(FilledPrediction::unfilled(template));
        };
        let mapping = parser.parse(raw, &self.schema)?;
        Ok(ResultMerger::new(&self.schema).merge(
            &mapping,
            template,
            parser.binding(),
            &self.provenance,
        ))
    }
}

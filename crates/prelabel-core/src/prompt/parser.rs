//! Response parsers: raw model text → validated [`AttributeMapping`].
//!
//! Each parser matches one request-time output constraint, which is why the
//! parser is chosen together with the request by the prompt strategy.

use crate::error::{PipelineError, PipelineResult};
use crate::schema::{AttributeSchema, Cardinality};
use crate::template::SlotBinding;
use crate::types::{AttributeMapping, LabelValue};
use serde_json::{Map, Value};

/// The three decoding strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseParser {
    /// Free text: a JSON list holding one object, wrapped in one leading and
    /// one trailing non-JSON line (code fences or chatter).
    FencedJson,
    /// Exactly one object; every property a single enumerated string.
    SingleLabel,
    /// Exactly one object; every property an array of enumerated strings.
    MultiLabel,
}

impl ResponseParser {
    /// Decode and validate `raw` against `schema`.
    pub fn parse(&self, raw: &str, schema: &AttributeSchema) -> PipelineResult<AttributeMapping> {
        let object = match self {
            ResponseParser::FencedJson => decode_fenced(raw)?,
            ResponseParser::SingleLabel | ResponseParser::MultiLabel => decode_object(raw.trim())?,
        };

        let mut mapping = AttributeMapping::new();
        for (key, value) in object {
            if !schema.contains(&key) {
                tracing::debug!("Ignoring unknown attribute '{key}' in model output");
                continue;
            }
            mapping.insert(key.clone(), self.label_value(&key, value)?);
        }

        validate(&mapping, schema)?;
        Ok(mapping)
    }

    /// How the parsed mapping is matched to template slots.
    pub fn binding(&self) -> SlotBinding {
        match self {
            ResponseParser::FencedJson => SlotBinding::ByName,
            ResponseParser::SingleLabel | ResponseParser::MultiLabel => SlotBinding::Positional,
        }
    }

    fn label_value(&self, key: &str, value: Value) -> PipelineResult<LabelValue> {
        match (self, value) {
            (ResponseParser::SingleLabel, Value::String(label)) => Ok(LabelValue::One(label)),
            (ResponseParser::SingleLabel, other) => Err(PipelineError::SchemaMismatch(format!(
                "'{key}' must be a single string, got {other}"
            ))),
            (_, Value::String(label)) => Ok(LabelValue::One(label)),
            (_, Value::Array(items)) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(label) => Ok(label),
                    other => Err(PipelineError::SchemaMismatch(format!(
                        "'{key}' contains a non-string label: {other}"
                    ))),
                })
                .collect::<PipelineResult<Vec<_>>>()
                .map(LabelValue::Many),
            (_, other) => Err(PipelineError::SchemaMismatch(format!(
                "'{key}' must be a string or a list of strings, got {other}"
            ))),
        }
    }
}

/// Drop the first and last line of `text`.
pub fn strip_outer_lines(text: &str) -> &str {
    let trimmed = text.trim();
    let start = trimmed.find('\n').map(|i| i + 1).unwrap_or(trimmed.len());
    let end = trimmed.rfind('\n').unwrap_or(0);
    if start > end {
        ""
    } else {
        &trimmed[start..end]
    }
}

fn decode_fenced(raw: &str) -> PipelineResult<Map<String, Value>> {
    let body = strip_outer_lines(raw);
    let decoded: Value = serde_json::from_str(body).map_err(|e| {
        PipelineError::MalformedOutput(format!("not valid JSON after unwrapping: {e}"))
    })?;
    match decoded {
        Value::Array(items) => match items.into_iter().next() {
            Some(Value::Object(object)) => Ok(object),
            Some(other) => Err(PipelineError::MalformedOutput(format!(
                "expected an object inside the list, got {other}"
            ))),
            None => Err(PipelineError::MalformedOutput("empty list".to_string())),
        },
        other => Err(PipelineError::MalformedOutput(format!(
            "expected a list holding one object, got {}",
            kind_of(&other)
        ))),
    }
}

fn decode_object(raw: &str) -> PipelineResult<Map<String, Value>> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(other) => Err(PipelineError::MalformedOutput(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
        Err(e) => Err(PipelineError::MalformedOutput(format!("not valid JSON: {e}"))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

/// Check a mapping against the schema: all attributes present, every label
/// legal, single-label attributes carrying exactly one label.
pub fn validate(mapping: &AttributeMapping, schema: &AttributeSchema) -> PipelineResult<()> {
    for attribute in schema.attributes() {
        let Some(value) = mapping.get(&attribute.name) else {
            return Err(PipelineError::SchemaMismatch(format!(
                "missing attribute '{}'",
                attribute.name
            )));
        };
        let labels = value.labels();
        if attribute.cardinality == Cardinality::One && labels.len() != 1 {
            return Err(PipelineError::SchemaMismatch(format!(
                "'{}' takes exactly one label, got {}",
                attribute.name,
                labels.len()
            )));
        }
        if let Some(bad) = labels.iter().find(|label| !attribute.allows(label)) {
            return Err(PipelineError::SchemaMismatch(format!(
                "'{bad}' is not a legal label for '{}'",
                attribute.name
            )));
        }
    }
    Ok(())
}

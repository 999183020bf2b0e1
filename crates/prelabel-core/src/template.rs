//! Result templates and the merger that fills them.
//!
//! A template is the skeleton of a Label Studio prediction: an ordered list
//! of slots, each addressed by a `from_name`/`to_name` pair and holding a
//! mutable `value`. The template is loaded once per run and never mutated;
//! every task fills its own clone.

use crate::error::PrelabelError;
use crate::schema::AttributeSchema;
use crate::types::{AttributeMapping, Provenance};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// One entry of a prediction result.
///
/// Only the fields the pipeline reads are typed; everything else (`id`,
/// `readonly`, relation endpoints, ...) is carried through untouched, and
/// absent fields stay absent on the way out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Slot {
    /// Replace the slot's text value with a single entry.
    pub fn set_text(&mut self, text: String) {
        self.value
            .get_or_insert_with(Map::new)
            .insert("text".to_string(), Value::Array(vec![Value::String(text)]));
    }

    /// First entry of the slot's text value, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.value
            .as_ref()?
            .get("text")
            .and_then(Value::as_array)
            .and_then(|texts| texts.first())
            .and_then(Value::as_str)
    }
}

/// `{to_name: first_text_value}` over a list of slots. Later slots with the
/// same `to_name` do not override earlier ones.
pub fn first_texts(slots: &[Slot]) -> BTreeMap<String, String> {
    let mut texts = BTreeMap::new();
    for slot in slots {
        if let (Some(to_name), Some(text)) = (&slot.to_name, slot.first_text()) {
            texts
                .entry(to_name.clone())
                .or_insert_with(|| text.to_string());
        }
    }
    texts
}

/// Prediction skeleton supplied by the task store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTemplate {
    pub result: Vec<Slot>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ResultTemplate {
    /// Load a template from a JSON file.
    pub fn load(path: &Path) -> Result<Self, PrelabelError> {
        let content = std::fs::read_to_string(path)?;
        let template: ResultTemplate = serde_json::from_str(&content)?;
        tracing::debug!(
            "Loaded result template with {} slot(s) from {:?}",
            template.result.len(),
            path
        );
        Ok(template)
    }
}

/// A template with its recognized slots filled, ready for upload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilledPrediction {
    #[serde(flatten)]
    inner: ResultTemplate,
}

impl FilledPrediction {
    /// Wrap a template copy without filling anything (used by the null strategy).
    pub fn unfilled(template: &ResultTemplate) -> Self {
        Self {
            inner: template.clone(),
        }
    }

    pub fn result(&self) -> &[Slot] {
        &self.inner.result
    }

    pub fn model_version(&self) -> Option<&str> {
        self.inner.extra.get("model_version").and_then(Value::as_str)
    }

    /// `{to_name: text}` for every filled slot.
    pub fn texts(&self) -> BTreeMap<String, String> {
        first_texts(&self.inner.result)
    }

    /// Full prediction body, as sent when updating an existing prediction.
    pub fn payload(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Only the `result` array, as sent when creating a prediction.
    pub fn result_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.inner.result)
    }
}

/// How decoded attribute values are matched to template slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotBinding {
    /// Slot `from_name` → attribute → value looked up by attribute name
    ByName,
    /// The n-th recognized slot receives the n-th decoded value
    Positional,
}

/// Fills result templates from attribute mappings.
pub struct ResultMerger<'a> {
    schema: &'a AttributeSchema,
}

impl<'a> ResultMerger<'a> {
    pub fn new(schema: &'a AttributeSchema) -> Self {
        Self { schema }
    }

    /// Fill a copy of `template` with `mapping`.
    ///
    /// Slots whose `from_name` is not bound to a schema attribute are left
    /// untouched, as are recognized slots with no corresponding value.
    /// `template` itself is never modified.
    pub fn merge(
        &self,
        mapping: &AttributeMapping,
        template: &ResultTemplate,
        binding: SlotBinding,
        provenance: &Provenance,
    ) -> FilledPrediction {
        let mut filled = template.clone();
        let positional: Vec<_> = mapping.values().collect();
        let mut position = 0;

        for slot in filled.result.iter_mut() {
            let Some(attribute) = slot
                .from_name
                .as_deref()
                .and_then(|name| self.schema.by_from_name(name))
            else {
                continue;
            };
            let value = match binding {
                SlotBinding::ByName => mapping.get(&attribute.name),
                SlotBinding::Positional => {
                    let value = positional.get(position).copied();
                    position += 1;
                    value
                }
            };
            let Some(value) = value else {
                tracing::debug!("No value for slot {} ({})", attribute.from_name, attribute.name);
                continue;
            };
            slot.set_text(value.serialized());
            slot.origin = Some(provenance.origin.clone());
        }

        filled.extra.insert(
            "model_version".to_string(),
            Value::String(provenance.model.clone()),
        );
        FilledPrediction { inner: filled }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::LabelValue;

    /// Template with one textarea slot per footwear attribute plus an
    /// unrelated slot the merger must leave alone.
    pub(crate) fn footwear_template() -> ResultTemplate {
        let mut result: Vec<Value> = (1..=8)
            .map(|i| {
                serde_json::json!({
                    "id": format!("slot{i}"),
                    "from_name": format!("answer{i}"),
                    "to_name": format!("q{i}"),
                    "type": "textarea",
                    "value": {"text": [""]}
                })
            })
            .collect();
        result.push(serde_json::json!({
            "from_name": "notes",
            "to_name": "image",
            "type": "textarea",
            "value": {"text": ["keep me"]}
        }));
        serde_json::from_value(serde_json::json!({ "result": result, "score": 0.5 })).unwrap()
    }

    pub(crate) fn footwear_mapping() -> AttributeMapping {
        let many =
            |labels: &[&str]| LabelValue::Many(labels.iter().map(|l| l.to_string()).collect());
        vec![
            ("Function", many(&["Running", "Hiking"])),
            ("Type", many(&["Sneakers"])),
            ("Main Color", LabelValue::One("Pastels".into())),
            ("Sub Color", many(&["Monochrome", "Dark/Moody"])),
            ("Upper Structure", LabelValue::One("One-Piece Upper".into())),
            ("Closure Type", many(&["Shoelace"])),
            ("Toe Shape", LabelValue::One("Round".into())),
            ("Heel Type", LabelValue::One("Flat".into())),
        ]
        .into_iter()
        .collect()
    }

    fn provenance() -> Provenance {
        Provenance::new("ChatGPT", "gpt-4o")
    }

    #[test]
    fn test_merge_fills_recognized_slots() {
        let schema = AttributeSchema::footwear();
        let merger = ResultMerger::new(&schema);
        let filled = merger.merge(
            &footwear_mapping(),
            &footwear_template(),
            SlotBinding::ByName,
            &provenance(),
        );

        let texts = filled.texts();
        assert_eq!(texts["q1"], "Running, Hiking");
        assert_eq!(texts["q3"], "Pastels");
        assert_eq!(texts["image"], "keep me");
        assert_eq!(filled.result()[0].origin.as_deref(), Some("ChatGPT"));
        assert_eq!(filled.result()[8].origin, None);
        assert_eq!(filled.model_version(), Some("gpt-4o"));
    }

    #[test]
    fn test_merge_does_not_mutate_template() {
        let schema = AttributeSchema::footwear();
        let template = footwear_template();
        let before = template.clone();
        ResultMerger::new(&schema).merge(
            &footwear_mapping(),
            &template,
            SlotBinding::ByName,
            &provenance(),
        );
        assert_eq!(template, before);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let schema = AttributeSchema::footwear();
        let merger = ResultMerger::new(&schema);
        let template = footwear_template();
        let mapping = footwear_mapping();
        for binding in [SlotBinding::ByName, SlotBinding::Positional] {
            let first = merger.merge(&mapping, &template, binding, &provenance());
            let second = merger.merge(&mapping, &template, binding, &provenance());
            assert_eq!(
                serde_json::to_string(&first).unwrap(),
                serde_json::to_string(&second).unwrap()
            );
        }
    }

    #[test]
    fn test_round_trip_by_to_name() {
        let schema = AttributeSchema::footwear();
        let mapping = footwear_mapping();
        let filled = ResultMerger::new(&schema).merge(
            &mapping,
            &footwear_template(),
            SlotBinding::ByName,
            &provenance(),
        );
        let texts = filled.texts();
        for attribute in schema.attributes() {
            let expected = mapping.get(&attribute.name).unwrap().serialized();
            assert_eq!(texts[&attribute.to_name], expected);
        }
    }

    #[test]
    fn test_positional_binding_ignores_names() {
        let schema = AttributeSchema::footwear();
        let mapping: AttributeMapping = vec![
            ("Type", LabelValue::One("Boots".into())),
            ("Function", LabelValue::One("Snow".into())),
        ]
        .into_iter()
        .collect();
        let filled = ResultMerger::new(&schema).merge(
            &mapping,
            &footwear_template(),
            SlotBinding::Positional,
            &provenance(),
        );
        let texts = filled.texts();
        // First slot (answer1 / Function) takes the first decoded value.
        assert_eq!(texts["q1"], "Boots");
        assert_eq!(texts["q2"], "Snow");
        // Slots beyond the decoded values keep their template text.
        assert_eq!(texts["q3"], "");
    }

    #[test]
    fn test_payload_shapes() {
        let schema = AttributeSchema::footwear();
        let filled = ResultMerger::new(&schema).merge(
            &footwear_mapping(),
            &footwear_template(),
            SlotBinding::ByName,
            &provenance(),
        );
        let payload = filled.payload().unwrap();
        assert_eq!(payload["model_version"], "gpt-4o");
        assert_eq!(payload["score"], 0.5);
        assert_eq!(payload["result"][0]["id"], "slot1");
        assert_eq!(filled.result_value().unwrap().as_array().unwrap().len(), 9);
    }

    #[test]
    fn test_load_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, serde_json::to_string(&footwear_template()).unwrap()).unwrap();
        let loaded = ResultTemplate::load(&path).unwrap();
        assert_eq!(loaded, footwear_template());
    }

    fn template_with_foreign_slots() -> Value {
        serde_json::json!({
            "result": [
                {"from_id": "a", "to_id": "b", "type": "relation", "direction": "right"},
                {"from_name": "answer1", "to_name": "q1", "value": {"text": [""]}},
                {"id": "r1", "from_name": "answer2", "to_name": "q2", "type": "textarea"}
            ],
            "score": 0.5
        })
    }

    #[test]
    fn test_unfilled_payload_matches_input() {
        let raw = template_with_foreign_slots();
        let template: ResultTemplate = serde_json::from_value(raw.clone()).unwrap();
        let out = FilledPrediction::unfilled(&template).payload().unwrap();
        assert_eq!(out, raw);
    }

    #[test]
    fn test_merge_adds_nothing_to_unrecognized_slots() {
        let schema = AttributeSchema::footwear();
        let template: ResultTemplate =
            serde_json::from_value(template_with_foreign_slots()).unwrap();
        let filled = ResultMerger::new(&schema).merge(
            &footwear_mapping(),
            &template,
            SlotBinding::ByName,
            &provenance(),
        );
        let result = filled.result_value().unwrap();

        assert_eq!(
            result[0],
            serde_json::json!({
                "from_id": "a",
                "to_id": "b",
                "type": "relation",
                "direction": "right"
            })
        );
        assert_eq!(result[1]["value"]["text"][0], "Running, Hiking");
        assert!(result[1].get("type").is_none());
        // A recognized slot without a value holder gets one.
        assert_eq!(result[2]["value"]["text"][0], "Sneakers");
        assert_eq!(result[2]["id"], "r1");
    }
}

//! Core data types shared by the parsers, the merger, and the flattener.

use serde::{Deserialize, Serialize};

/// Label(s) assigned to one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    One(String),
    Many(Vec<String>),
}

impl LabelValue {
    /// All labels carried by this value.
    pub fn labels(&self) -> Vec<&str> {
        match self {
            LabelValue::One(label) => vec![label.as_str()],
            LabelValue::Many(labels) => labels.iter().map(String::as_str).collect(),
        }
    }

    /// Text written into a template slot: lists are comma-joined, scalars kept as-is.
    pub fn serialized(&self) -> String {
        match self {
            LabelValue::One(label) => label.clone(),
            LabelValue::Many(labels) => labels.join(", "),
        }
    }
}

/// Attribute name → label(s), in the order the model emitted them.
///
/// Order is significant: structured strategies map values onto template
/// slots by position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMapping {
    entries: Vec<(String, LabelValue)>,
}

impl AttributeMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced entry keeps its original position.
    pub fn insert(&mut self, attribute: impl Into<String>, value: LabelValue) {
        let attribute = attribute.into();
        match self.entries.iter_mut().find(|(name, _)| *name == attribute) {
            Some((_, existing)) => *existing = value,
            None => self.entries.push((attribute, value)),
        }
    }

    pub fn get(&self, attribute: &str) -> Option<&LabelValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, attribute: &str) -> bool {
        self.get(attribute).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn values(&self) -> impl Iterator<Item = &LabelValue> {
        self.entries.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, LabelValue)> for AttributeMapping {
    fn from_iter<I: IntoIterator<Item = (K, LabelValue)>>(iter: I) -> Self {
        let mut mapping = Self::new();
        for (name, value) in iter {
            mapping.insert(name, value);
        }
        mapping
    }
}

/// Who produced a prediction: stamped on every filled slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Free-form origin label (e.g. "ChatGPT")
    pub origin: String,
    /// Model identifier requested from the endpoint
    pub model: String,
}

impl Provenance {
    pub fn new(origin: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            model: model.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_joins_lists() {
        let value = LabelValue::Many(vec!["Running".into(), "Hiking".into()]);
        assert_eq!(value.serialized(), "Running, Hiking");
        assert_eq!(LabelValue::One("Round".into()).serialized(), "Round");
    }

    #[test]
    fn test_insert_replaces_in_place() {
        let mut mapping = AttributeMapping::new();
        mapping.insert("Function", LabelValue::One("Daily".into()));
        mapping.insert("Type", LabelValue::One("Boots".into()));
        mapping.insert("Function", LabelValue::One("Golf".into()));

        let names: Vec<_> = mapping.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["Function", "Type"]);
        assert_eq!(mapping.get("Function"), Some(&LabelValue::One("Golf".into())));
    }

    #[test]
    fn test_label_value_deserializes_untagged() {
        let one: LabelValue = serde_json::from_str(r#""Flat""#).unwrap();
        let many: LabelValue = serde_json::from_str(r#"["Flat","Block"]"#).unwrap();
        assert_eq!(one, LabelValue::One("Flat".into()));
        assert_eq!(many.labels(), vec!["Flat", "Block"]);
    }
}

//! Instruction texts and JSON response schemas derived from the attribute schema.

use crate::llm::ResponseSchema;
use crate::schema::AttributeSchema;
use serde_json::{json, Map, Value};

/// Name reported to endpoints that take a named response schema.
pub const RESPONSE_SCHEMA_NAME: &str = "footwear_attributes";

fn label_listing(schema: &AttributeSchema) -> String {
    schema
        .attributes()
        .iter()
        .map(|attribute| {
            let labels: Vec<String> = attribute
                .labels
                .iter()
                .map(|label| format!("\"{label}\""))
                .collect();
            format!("\"{}\": [{}]", attribute.name, labels.join(", "))
        })
        .collect::<Vec<_>>()
        .join(",\n")
}

/// Free-text instruction asking for a fenced JSON list holding one object.
pub fn fenced_json_instruction(schema: &AttributeSchema) -> String {
    format!(
        "Analyze this shoe image and return structured annotations in JSON format using this schema:\n\
         Condition = {{\"attribute\": [str]}}\n\
         Return: list[Condition]\n\
         Ensure attribute and value follows this mapping:\n\
         {}\n\
         The key should be a string corresponding to each of the attributes listed above.\n\
         The value should be a list containing the corresponding labels from the provided categories.\n\
         Return only 1 JSON dictionary inside a list, wrapped in a ```json code block. \
         Follow the possible values for each attribute and do not generate your own attributes.",
        label_listing(schema)
    )
}

/// System text shared by the structured strategies.
pub fn structured_system_text() -> String {
    "You are an expert footwear annotator. You label product images of shoes \
     with the exact categories you are given and nothing else."
        .to_string()
}

/// User instruction for the structured strategies.
pub fn structured_instruction(multi_label: bool) -> String {
    if multi_label {
        "Classify the shoe in this image. For every attribute, choose all labels that apply \
         from its allowed values."
            .to_string()
    } else {
        "Classify the shoe in this image. For every attribute, choose the single label that \
         fits best from its allowed values."
            .to_string()
    }
}

/// Strict JSON schema: one property per attribute, in schema order.
///
/// Single-label: each property an enumerated string.
/// Multi-label: each property an array of enumerated strings.
pub fn response_schema(schema: &AttributeSchema, multi_label: bool) -> ResponseSchema {
    let mut properties = Map::new();
    for attribute in schema.attributes() {
        let labels = json!(attribute.labels);
        let property = if multi_label {
            json!({"type": "array", "items": {"type": "string", "enum": labels}})
        } else {
            json!({"type": "string", "enum": labels})
        };
        properties.insert(attribute.name.clone(), property);
    }

    let required: Vec<Value> = schema
        .attributes()
        .iter()
        .map(|a| Value::String(a.name.clone()))
        .collect();

    ResponseSchema {
        name: RESPONSE_SCHEMA_NAME.to_string(),
        schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        }),
    }
}

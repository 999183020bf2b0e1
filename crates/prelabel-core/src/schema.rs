//! Classification taxonomy: attributes, their legal labels, and the result
//! template slots they are bound to.
//!
//! The schema is pure data. It is built once per run and shared read-only by
//! every prompt strategy, the merger, and the flattener.

use serde::Serialize;

/// Whether an attribute accepts one label or several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// One classification dimension (e.g. "Function").
#[derive(Debug, Clone)]
pub struct Attribute {
    /// Attribute name as it appears in model output
    pub name: String,
    /// Legal label values, in presentation order
    pub labels: Vec<String>,
    pub cardinality: Cardinality,
    /// `from_name` of the result template slot this attribute fills
    pub from_name: String,
    /// `to_name` of the slot; also the question key used by the flattener
    pub to_name: String,
}

impl Attribute {
    pub fn new(
        name: &str,
        labels: &[&str],
        cardinality: Cardinality,
        from_name: &str,
        to_name: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            cardinality,
            from_name: from_name.to_string(),
            to_name: to_name.to_string(),
        }
    }

    pub fn allows(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

/// Ordered, immutable lookup table of attributes.
#[derive(Debug, Clone)]
pub struct AttributeSchema {
    attributes: Vec<Attribute>,
}

const COLOR_TONES: &[&str] = &[
    "Neutral tones",
    "Pastels",
    "Bright/Variant",
    "Dark/Moody",
    "Monochrome",
];

impl AttributeSchema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        Self { attributes }
    }

    /// The footwear taxonomy the annotation project is configured with.
    pub fn footwear() -> Self {
        use Cardinality::{Many, One};
        Self::new(vec![
            Attribute::new(
                "Function",
                &[
                    "Daily",
                    "Fashion",
                    "Running",
                    "Hiking",
                    "Walking",
                    "Soccer",
                    "Basketball",
                    "Training",
                    "Gym",
                    "Golf",
                    "Tennis",
                    "Skateboard",
                    "Snow",
                    "Surfing",
                    "Swimming",
                    "Aqua",
                    "Combat",
                ],
                Many,
                "answer1",
                "q1",
            ),
            Attribute::new(
                "Type",
                &[
                    "Sneakers",
                    "Sports",
                    "Trainers",
                    "Dress Shoes",
                    "Sandals",
                    "Heels",
                    "Pumps",
                    "Boots",
                    "Traditional",
                    "Slipper",
                ],
                Many,
                "answer2",
                "q2",
            ),
            Attribute::new("Main Color", COLOR_TONES, One, "answer3", "q3"),
            Attribute::new("Sub Color", COLOR_TONES, Many, "answer4", "q4"),
            Attribute::new(
                "Upper Structure",
                &["No Upper", "One-Piece Upper", "Multi-Piece Upper"],
                One,
                "answer5",
                "q5",
            ),
            Attribute::new(
                "Closure Type",
                &[
                    "Shoelace",
                    "Slip-on",
                    "Velcro",
                    "Straps",
                    "Buckle",
                    "Zipper",
                    "Hook and Loop",
                    "Dial",
                ],
                Many,
                "answer6",
                "q6",
            ),
            Attribute::new(
                "Toe Shape",
                &["Round", "Pointed", "Square", "Almond"],
                One,
                "answer7",
                "q7",
            ),
            Attribute::new(
                "Heel Type",
                &["Flat", "Block", "Stiletto", "Wedge"],
                One,
                "answer8",
                "q8",
            ),
        ])
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Legal labels for an attribute (empty for unknown attributes).
    pub fn labels_for(&self, name: &str) -> &[String] {
        self.get(name).map(|a| a.labels.as_slice()).unwrap_or(&[])
    }

    pub fn cardinality_of(&self, name: &str) -> Option<Cardinality> {
        self.get(name).map(|a| a.cardinality)
    }

    /// Attribute bound to a template slot, looked up by the slot's `from_name`.
    pub fn by_from_name(&self, from_name: &str) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.from_name == from_name)
    }

    /// Question keys (slot `to_name`s) in schema order.
    pub fn question_keys(&self) -> Vec<&str> {
        self.attributes.iter().map(|a| a.to_name.as_str()).collect()
    }
}

impl Default for AttributeSchema {
    fn default() -> Self {
        Self::footwear()
    }
}

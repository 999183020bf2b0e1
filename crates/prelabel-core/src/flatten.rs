//! Export flattening: compare model predictions against human annotations.
//!
//! Reads a Label Studio JSON export (a list of tasks, each with its
//! annotations and the prediction each annotation started from) and emits
//! one [`FlatRecord`] per task. Only the first annotation of a task is
//! considered. A task without any annotation violates the input contract
//! and aborts the conversion.

use crate::error::FlattenError;
use crate::output::{CsvWriter, OutputFormat, OutputWriter};
use crate::schema::AttributeSchema;
use crate::template::{first_texts, Slot};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Leading columns, before the per-question triples.
pub const BASE_COLUMNS: [&str; 8] = [
    "task_id",
    "annotation_id",
    "image",
    "annotator",
    "created_at",
    "updated_at",
    "lead_time",
    "model_version",
];

/// One task of an export.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportTask {
    pub id: u64,
    #[serde(default)]
    pub data: Map<String, Value>,
    #[serde(default)]
    pub annotations: Vec<ExportAnnotation>,
}

/// A human annotation as exported.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportAnnotation {
    #[serde(default)]
    pub id: Option<u64>,
    /// User id, or a user object when the export expands users
    #[serde(default)]
    pub completed_by: Value,
    #[serde(default)]
    pub result: Vec<Slot>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub lead_time: Option<f64>,
    /// Prediction the annotator started from (`{}` or absent when none)
    #[serde(default)]
    pub prediction: Option<ExportPrediction>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportPrediction {
    #[serde(default)]
    pub result: Vec<Slot>,
    #[serde(default)]
    pub model_version: Option<String>,
}

impl ExportAnnotation {
    /// Annotator as a display string: email when present, else the id.
    pub fn annotator(&self) -> Option<String> {
        match &self.completed_by {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(user) => user
                .get("email")
                .and_then(Value::as_str)
                .map(String::from)
                .or_else(|| user.get("id").map(|id| id.to_string())),
            other => Some(other.to_string()),
        }
    }
}

/// Prediction vs annotation for one question.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionComparison {
    pub prediction: Option<String>,
    pub annotation: Option<String>,
    /// `None` when either side is missing
    pub changed: Option<bool>,
}

impl QuestionComparison {
    pub fn new(prediction: Option<String>, annotation: Option<String>) -> Self {
        let changed = match (&prediction, &annotation) {
            (Some(p), Some(a)) => Some(p != a),
            _ => None,
        };
        Self {
            prediction,
            annotation,
            changed,
        }
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRecord {
    pub task_id: u64,
    pub annotation_id: Option<u64>,
    pub image: Option<String>,
    pub annotator: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub lead_time: Option<f64>,
    pub model_version: Option<String>,
    /// In question-key order
    pub questions: Vec<(String, QuestionComparison)>,
}

impl FlatRecord {
    pub fn question(&self, key: &str) -> Option<&QuestionComparison> {
        self.questions
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, comparison)| comparison)
    }

    /// Cells in column order, as strings.
    pub fn cells(&self) -> Vec<Option<String>> {
        let mut cells = vec![
            Some(self.task_id.to_string()),
            self.annotation_id.map(|id| id.to_string()),
            self.image.clone(),
            self.annotator.clone(),
            self.created_at.clone(),
            self.updated_at.clone(),
            self.lead_time.map(|t| t.to_string()),
            self.model_version.clone(),
        ];
        for (_, q) in &self.questions {
            cells.push(q.prediction.clone());
            cells.push(q.annotation.clone());
            cells.push(q.changed.map(|c| c.to_string()));
        }
        cells
    }
}

impl Serialize for FlatRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = BASE_COLUMNS.len() + 3 * self.questions.len();
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("task_id", &self.task_id)?;
        map.serialize_entry("annotation_id", &self.annotation_id)?;
        map.serialize_entry("image", &self.image)?;
        map.serialize_entry("annotator", &self.annotator)?;
        map.serialize_entry("created_at", &self.created_at)?;
        map.serialize_entry("updated_at", &self.updated_at)?;
        map.serialize_entry("lead_time", &self.lead_time)?;
        map.serialize_entry("model_version", &self.model_version)?;
        for (key, q) in &self.questions {
            map.serialize_entry(&format!("{key}_prediction"), &q.prediction)?;
            map.serialize_entry(&format!("{key}_annotation"), &q.annotation)?;
            map.serialize_entry(&format!("{key}_changed"), &q.changed)?;
        }
        map.end()
    }
}

/// Which files [`AnnotationFlattener::convert_file`] writes.
#[derive(Debug, Clone, Copy)]
pub struct ConvertOptions {
    pub csv: bool,
    pub json: bool,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            csv: true,
            json: true,
        }
    }
}

/// Result of converting one export file.
#[derive(Debug, Clone)]
pub struct ConvertReport {
    pub records: usize,
    pub csv_path: Option<PathBuf>,
    pub json_path: Option<PathBuf>,
}

/// Turns exported tasks into comparison records.
#[derive(Debug, Clone)]
pub struct AnnotationFlattener {
    question_keys: Vec<String>,
    data_key: String,
}

impl AnnotationFlattener {
    pub fn new(schema: &AttributeSchema, data_key: &str) -> Self {
        Self {
            question_keys: schema.question_keys().into_iter().map(String::from).collect(),
            data_key: data_key.to_string(),
        }
    }

    pub fn question_keys(&self) -> &[String] {
        &self.question_keys
    }

    /// Column names in output order.
    pub fn columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for key in &self.question_keys {
            columns.push(format!("{key}_prediction"));
            columns.push(format!("{key}_annotation"));
            columns.push(format!("{key}_changed"));
        }
        columns
    }

    /// Flatten one task. Fails if the task has no annotation.
    pub fn flatten_task(&self, task: &ExportTask) -> Result<FlatRecord, FlattenError> {
        let annotation = task.annotations.first().ok_or_else(|| {
            FlattenError::PreconditionViolation(format!("task {} has no annotations", task.id))
        })?;
        if task.annotations.len() > 1 {
            tracing::debug!(
                "Task {} has {} annotations, using the first",
                task.id,
                task.annotations.len()
            );
        }

        let annotated = first_texts(&annotation.result);
        let predicted: BTreeMap<String, String> = annotation
            .prediction
            .as_ref()
            .map(|p| first_texts(&p.result))
            .unwrap_or_default();

        let questions = self
            .question_keys
            .iter()
            .map(|key| {
                let comparison = QuestionComparison::new(
                    predicted.get(key).cloned(),
                    annotated.get(key).cloned(),
                );
                (key.clone(), comparison)
            })
            .collect();

        Ok(FlatRecord {
            task_id: task.id,
            annotation_id: annotation.id,
            image: task
                .data
                .get(&self.data_key)
                .and_then(Value::as_str)
                .map(String::from),
            annotator: annotation.annotator(),
            created_at: annotation.created_at.clone(),
            updated_at: annotation.updated_at.clone(),
            lead_time: annotation.lead_time,
            model_version: annotation
                .prediction
                .as_ref()
                .and_then(|p| p.model_version.clone()),
            questions,
        })
    }

    /// Flatten every task in export order.
    pub fn flatten(&self, tasks: &[ExportTask]) -> Result<Vec<FlatRecord>, FlattenError> {
        tasks.iter().map(|task| self.flatten_task(task)).collect()
    }

    pub fn write_csv<W: std::io::Write>(
        &self,
        records: &[FlatRecord],
        writer: W,
    ) -> Result<(), FlattenError> {
        let mut csv = CsvWriter::new(writer);
        csv.write_header(&self.columns())?;
        for record in records {
            csv.write_row(&record.cells())?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_json<W: std::io::Write>(
        &self,
        records: &[FlatRecord],
        writer: W,
    ) -> Result<(), FlattenError> {
        let mut json = OutputWriter::new(writer, OutputFormat::Json, true);
        json.write_all(records)?;
        json.flush()?;
        Ok(())
    }

    /// Read `input`, flatten it, and write `formatted_<stem>.csv` and/or
    /// `formatted_<stem>.json` into `output_dir` (created if missing).
    pub fn convert_file(
        &self,
        input: &Path,
        output_dir: &Path,
        options: ConvertOptions,
    ) -> Result<ConvertReport, FlattenError> {
        let tasks = read_export(input)?;
        let records = self.flatten(&tasks)?;
        tracing::info!("Flattened {} task(s) from {:?}", records.len(), input);

        std::fs::create_dir_all(output_dir)?;
        let stem = output_stem(input);
        let mut report = ConvertReport {
            records: records.len(),
            csv_path: None,
            json_path: None,
        };

        if options.csv {
            let path = output_dir.join(format!("formatted_{stem}.csv"));
            self.write_csv(&records, BufWriter::new(File::create(&path)?))?;
            tracing::info!("Wrote {:?}", path);
            report.csv_path = Some(path);
        }
        if options.json {
            let path = output_dir.join(format!("formatted_{stem}.json"));
            self.write_json(&records, BufWriter::new(File::create(&path)?))?;
            tracing::info!("Wrote {:?}", path);
            report.json_path = Some(path);
        }
        Ok(report)
    }
}

impl Default for AnnotationFlattener {
    fn default() -> Self {
        Self::new(&AttributeSchema::footwear(), "image")
    }
}

/// Parse an export file (a JSON array of tasks).
pub fn read_export(path: &Path) -> Result<Vec<ExportTask>, FlattenError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// File name up to its first `.` (`project-3-at-2024.json` → `project-3-at-2024`).
pub fn output_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.split('.').next().unwrap_or_default().to_string()
}

//! Error types for the pre-annotation pipeline.
//!
//! Errors are organized by component so that every log line and every
//! failure carries the context needed to debug a single task after the fact
//! (task id, image reference, HTTP status, offending attribute).

use thiserror::Error;

/// Top-level error type for prelabel operations.
#[derive(Error, Debug)]
pub enum PrelabelError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Annotation pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Task store errors
    #[error("Task store error: {0}")]
    Store(#[from] StoreError),

    /// Export flattening errors
    #[error("Flatten error: {0}")]
    Flatten(#[from] FlattenError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised while producing a prediction for one task.
///
/// Whether an error ends the task or earns another attempt is decided by
/// [`crate::llm::retry::classify`], not by the variant alone.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Model endpoint call failed (transport error or non-2xx status)
    #[error("LLM error: {message}")]
    Llm {
        message: String,
        status_code: Option<u16>,
    },

    /// The model declined to answer (policy refusal)
    #[error("LLM refused the request: {0}")]
    Refused(String),

    /// Operation timed out
    #[error("Timeout in {stage} stage after {timeout_ms}ms")]
    Timeout { stage: String, timeout_ms: u64 },

    /// The image could not be resolved or loaded
    #[error("Image error for {reference}: {message}")]
    Image { reference: String, message: String },

    /// Model output could not be decoded as the expected structure
    #[error("Malformed model output: {0}")]
    MalformedOutput(String),

    /// Decoded output does not fit the attribute schema in force
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Strategy identifier not in the allow-list
    #[error("Unknown prompt strategy '{0}'")]
    UnknownStrategy(String),
}

/// Task store (Label Studio) errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// HTTP call failed or returned a non-2xx status
    #[error("{message}")]
    Http {
        message: String,
        status_code: Option<u16>,
    },

    /// Response body did not have the expected shape
    #[error("Failed to decode task store response: {0}")]
    Decode(String),

    /// Prediction could not be serialized for upload
    #[error("Failed to encode prediction: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors raised by the export flattener.
#[derive(Error, Debug)]
pub enum FlattenError {
    /// Input violates a documented precondition (e.g. a task without annotations)
    #[error("Precondition violated: {0}")]
    PreconditionViolation(String),

    /// Reading the export or writing an output file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Export is not valid JSON or has an unexpected shape
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience type alias for prelabel results.
pub type Result<T> = std::result::Result<T, PrelabelError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

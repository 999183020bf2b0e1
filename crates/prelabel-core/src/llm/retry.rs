//! Failure classification and backoff for model queries.
//!
//! A failure either ends the task immediately (the endpoint rejected the
//! request itself) or earns another attempt (everything else).

use crate::error::PipelineError;
use std::time::Duration;

/// How the retry controller treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Try again while budget remains
    Retryable,
    /// Abandon the task, no further attempts
    Fatal,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureClass::Retryable => write!(f, "retryable"),
            FailureClass::Fatal => write!(f, "fatal"),
        }
    }
}

/// Classify a failed attempt.
///
/// Fatal: policy refusals and 4xx rejections (bad request, auth, unknown
/// model), except 408 and 429. Retryable: rate limits, server errors,
/// transport failures without a status, timeouts, malformed output, and
/// schema mismatches.
pub fn classify(error: &PipelineError) -> FailureClass {
    match error {
        PipelineError::Refused(_) | PipelineError::UnknownStrategy(_) => FailureClass::Fatal,
        PipelineError::Llm {
            status_code: Some(code),
            ..
        } if (400..=499).contains(code) && *code != 408 && *code != 429 => FailureClass::Fatal,
        _ => FailureClass::Retryable,
    }
}

/// Calculate exponential backoff duration for a given attempt.
///
/// Uses `base_delay * 2^attempt` with a cap at 30 seconds.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(30_000))
}

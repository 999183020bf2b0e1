//! Bounded retry around a single annotation attempt.
//!
//! Each attempt ends in one of three states: parsed (stop, success),
//! retryable failure (try again while budget remains), or fatal failure
//! (stop immediately, whatever budget is left).

use crate::error::{PipelineError, PipelineResult};
use crate::llm::retry::{self, FailureClass};
use std::future::Future;

/// Attempt budget and pacing.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per task, including the first
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds (0 = retry immediately)
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 0,
        }
    }
}

/// Terminal outcome for one task.
#[derive(Debug)]
pub enum RetryOutcome<T> {
    /// An attempt succeeded after `failed_attempts` retryable failures
    Parsed { value: T, failed_attempts: u32 },
    /// The endpoint rejected the request; no further attempts were made
    Fatal { error: PipelineError, attempts: u32 },
    /// Every attempt failed retryably
    Exhausted {
        attempts: u32,
        last_error: Option<PipelineError>,
    },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Parsed {
                failed_attempts, ..
            } => failed_attempts + 1,
            RetryOutcome::Fatal { attempts, .. } | RetryOutcome::Exhausted { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, RetryOutcome::Parsed { .. })
    }
}

/// Drives attempts until one parses, one fails fatally, or the budget runs out.
#[derive(Debug, Clone, Default)]
pub struct RetryController {
    policy: RetryPolicy,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Run `attempt` (called with the 1-based attempt number) under the policy.
    ///
    /// `subject` identifies the task or image in log lines.
    pub async fn run<T, F, Fut>(&self, subject: &str, mut attempt: F) -> RetryOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = PipelineResult<T>>,
    {
        let max = self.policy.max_attempts;
        let mut last_error = None;

        for n in 1..=max {
            if n > 1 && self.policy.base_delay_ms > 0 {
                let delay = retry::backoff_duration(n - 2, self.policy.base_delay_ms);
                tracing::debug!("Retry {n}/{max} for {subject} after {delay:?}");
                tokio::time::sleep(delay).await;
            }

            match attempt(n).await {
                Ok(value) => {
                    return RetryOutcome::Parsed {
                        value,
                        failed_attempts: n - 1,
                    };
                }
                Err(error) => match retry::classify(&error) {
                    FailureClass::Fatal => {
                        tracing::error!(
                            subject,
                            attempt = n,
                            class = %FailureClass::Fatal,
                            "Request rejected, skipping: {error}"
                        );
                        return RetryOutcome::Fatal { error, attempts: n };
                    }
                    FailureClass::Retryable => {
                        tracing::warn!(
                            subject,
                            attempt = n,
                            class = %FailureClass::Retryable,
                            "Attempt {n}/{max} failed: {error}"
                        );
                        last_error = Some(error);
                    }
                },
            }
        }

        tracing::error!(
            subject,
            attempts = max,
            "Failed after {max} attempt(s), skipping"
        );
        RetryOutcome::Exhausted {
            attempts: max,
            last_error,
        }
    }
}

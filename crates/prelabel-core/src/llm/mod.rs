//! Model endpoint integration.
//!
//! Provides a provider abstraction over the supported vision model backends
//! (OpenAI-compatible Chat Completions, Ollama) and the failure
//! classification the retry controller relies on.

pub(crate) mod ollama;
pub(crate) mod openai;
pub(crate) mod provider;
pub mod retry;

pub use provider::{
    resolve_env_var, ImageInput, LlmProvider, LlmProviderFactory, LlmRequest, LlmResponse,
    ResponseSchema,
};
pub use retry::FailureClass;

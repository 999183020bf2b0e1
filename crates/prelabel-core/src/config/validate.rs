//! Configuration validation with range and allow-list checks.

use crate::error::ConfigError;
use crate::llm::LlmProviderFactory;
use crate::prompt::StrategyKind;

use super::Config;

impl Config {
    /// Validate configuration values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pipeline.max_retries == 0 {
            return Err(ConfigError::ValidationError(
                "pipeline.max_retries must be > 0".into(),
            ));
        }
        if self.label_studio.project_id == 0 {
            return Err(ConfigError::ValidationError(
                "label_studio.project_id must be > 0".into(),
            ));
        }
        if self.llm.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "llm.max_tokens must be > 0".into(),
            ));
        }
        if self.llm.openai.timeout_ms == 0 || self.llm.ollama.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "llm timeout_ms must be > 0".into(),
            ));
        }
        if !LlmProviderFactory::PROVIDERS.contains(&self.llm.provider.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "llm.provider must be one of: {}",
                LlmProviderFactory::PROVIDERS.join(", ")
            )));
        }
        if self.prompt.strategy.parse::<StrategyKind>().is_err() {
            return Err(ConfigError::ValidationError(format!(
                "prompt.strategy '{}' must be one of: {}",
                self.prompt.strategy,
                StrategyKind::ids().join(", ")
            )));
        }
        if self.prompt.origin.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "prompt.origin must not be empty".into(),
            ));
        }
        if self.prompt.model.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "prompt.model must not be empty".into(),
            ));
        }
        if self.images.data_key.is_empty() {
            return Err(ConfigError::ValidationError(
                "images.data_key must not be empty".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_passes_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_max_retries() {
        let mut config = Config::default();
        config.pipeline.max_retries = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn test_validate_rejects_unknown_strategy() {
        let mut config = Config::default();
        config.prompt.strategy = "prompts.prompts.Prompt_1".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prompt.strategy"));
        assert!(err.to_string().contains("multi_label"));
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let mut config = Config::default();
        config.llm.provider = "hyperbolic".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("llm.provider"));
    }

    #[test]
    fn test_validate_rejects_blank_origin() {
        let mut config = Config::default();
        config.prompt.origin = "  ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("prompt.origin"));
    }

    #[test]
    fn test_validate_rejects_zero_project() {
        let mut config = Config::default();
        config.label_studio.project_id = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("project_id"));
    }
}

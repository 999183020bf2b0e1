//! Configuration management for prelabel.
//!
//! Configuration is loaded from a TOML file with sensible defaults for every
//! section. Secrets may be given as `${ENV_VAR}` references.

mod types;
mod validate;

pub use types::*;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model endpoint settings
    pub llm: LlmConfig,

    /// Prompt strategy selection
    pub prompt: PromptConfig,

    /// Task store settings
    pub label_studio: LabelStudioConfig,

    /// Image resolution settings
    pub images: ImagesConfig,

    /// Annotation run settings
    pub pipeline: PipelineConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories:
    /// - macOS: ~/Library/Application Support/com.prelabel.prelabel/config.toml
    /// - Linux: ~/.config/prelabel/config.toml
    /// - Windows: C:\Users\<User>\AppData\Roaming\prelabel\config\config.toml
    ///
    /// Falls back to ~/.prelabel/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "prelabel", "prelabel")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".prelabel").join("config.toml")
            })
    }

    /// Resolved template path (with ~ expansion).
    pub fn template_path(&self) -> PathBuf {
        let path_str = self.pipeline.template_path.to_string_lossy();
        PathBuf::from(shellexpand::tilde(&path_str).into_owned())
    }

    /// Resolved local image directory (with ~ expansion).
    pub fn local_image_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.images.local_dir).into_owned())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }
}

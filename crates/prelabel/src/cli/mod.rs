//! Command handlers.

pub mod annotate;
pub mod config;
pub mod convert;
pub mod strategies;

use prelabel_core::{Config, ConfigError};
use std::path::{Path, PathBuf};

/// Load the config from `--config` when given, else from the default path.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    match path {
        Some(path) => Config::load_from(&expand(path)),
        None => Config::load(),
    }
}

/// Config file in effect: `--config` when given, else the default path.
pub fn config_path(path: Option<&Path>) -> PathBuf {
    path.map(expand).unwrap_or_else(Config::default_path)
}

/// Expand `~` in a user-supplied path.
pub fn expand(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_explicit_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prelabel.toml");
        std::fs::write(&path, "[label_studio]\nproject_id = 12\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.label_studio.project_id, 12);
        assert_eq!(config_path(Some(&path)), path);
    }

    #[test]
    fn test_load_missing_explicit_config_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.toml"))).is_err());
    }
}

//! The `prelabel config` command for configuration management.

use clap::{Args, Subcommand};
use prelabel_core::Config;
use std::path::Path;

/// Arguments for the `config` command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

/// Subcommands for configuration management.
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,

    /// Show config file path
    Path,

    /// Initialize a new config file with defaults
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Execute the config command.
pub async fn execute(args: ConfigArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Show => {
            let config = super::load_config(config_path)?;
            println!("{}", config.to_toml()?);
        }

        ConfigCommand::Path => {
            println!("{}", super::config_path(config_path).display());
        }

        ConfigCommand::Init { force } => {
            let path = super::config_path(config_path);
            init(&path, force)?;
            tracing::info!("Config file created at: {}", path.display());
            println!("Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

/// Write the default config to `path`.
fn init(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at: {}\nUse --force to overwrite.",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, Config::default().to_toml()?)?;
    Ok(())
}

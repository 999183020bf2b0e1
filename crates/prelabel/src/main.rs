//! Prelabel CLI - pre-annotate Label Studio image tasks with a vision model.
//!
//! # Usage
//!
//! ```bash
//! # Annotate every task of the configured project
//! prelabel annotate
//!
//! # Try a strategy on the first 10 tasks without uploading
//! prelabel annotate --strategy multi_label --limit 10 --dry-run
//!
//! # Compare predictions with human annotations from an export
//! prelabel convert --input export.json --output-dir ./reports
//!
//! # View configuration
//! prelabel config show
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;
mod logging;

/// Prelabel - pre-annotate Label Studio image tasks with a vision language model.
#[derive(Parser, Debug)]
#[command(name = "prelabel")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file (defaults to the per-user config path)
    #[arg(short, long, global = true, env = "PRELABEL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Query the model for every task and upload predictions
    Annotate(cli::annotate::AnnotateArgs),

    /// Flatten a Label Studio export into prediction-vs-annotation tables
    Convert(cli::convert::ConvertArgs),

    /// List the available prompt strategies
    Strategies,

    /// View and manage configuration
    Config(cli::config::ConfigArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    // Logging isn't initialized yet, so use eprintln for config warnings.
    let config = match cli::load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!(
                "Warning: Failed to load config: {e}\n  \
                 Using default configuration. Check your config file with `prelabel config path`."
            );
            prelabel_core::Config::default()
        }
    };
    logging::init_from_config(&config, cli.verbose, cli.json_logs);

    tracing::debug!("Prelabel v{}", prelabel_core::VERSION);

    match cli.command {
        Commands::Annotate(args) => cli::annotate::execute(args, config_path).await,
        Commands::Convert(args) => cli::convert::execute(args, config_path).await,
        Commands::Strategies => cli::strategies::execute().await,
        Commands::Config(args) => cli::config::execute(args, config_path).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_annotate_flags() {
        let cli = Cli::try_parse_from([
            "prelabel",
            "--verbose",
            "annotate",
            "--strategy",
            "single_label",
            "--limit",
            "3",
            "--dry-run",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Annotate(args) => {
                assert_eq!(args.strategy.as_deref(), Some("single_label"));
                assert_eq!(args.limit, Some(3));
                assert!(args.dry_run);
            }
            other => panic!("expected annotate, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_convert_requires_input() {
        assert!(Cli::try_parse_from(["prelabel", "convert", "--output-dir", "out"]).is_err());
        let cli = Cli::try_parse_from([
            "prelabel", "convert", "--input", "e.json", "--output-dir", "out", "--no-json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Convert(ref a) if a.no_json && !a.no_csv));
    }
}

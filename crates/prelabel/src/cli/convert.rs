//! The `prelabel convert` command: flatten an export into comparison tables.

use clap::Args;
use prelabel_core::{ConvertOptions, Prelabel};
use std::path::{Path, PathBuf};

/// Arguments for the `convert` command.
#[derive(Args, Debug)]
pub struct ConvertArgs {
    /// Label Studio JSON export
    #[arg(short, long)]
    pub input: PathBuf,

    /// Directory for formatted_<name>.csv / .json (created if missing)
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Skip the CSV output
    #[arg(long)]
    pub no_csv: bool,

    /// Skip the JSON output
    #[arg(long)]
    pub no_json: bool,
}

/// Execute the convert command.
pub async fn execute(args: ConvertArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let input = super::expand(&args.input);
    if !input.exists() {
        anyhow::bail!(
            "Input path does not exist: {:?}\n\n  Hint: Export the project from Label Studio as JSON first.",
            input
        );
    }
    if args.no_csv && args.no_json {
        anyhow::bail!("Nothing to write: both --no-csv and --no-json were given.");
    }

    let config = super::load_config(config_path)?;
    let flattener = Prelabel::new(config).flattener();
    let options = ConvertOptions {
        csv: !args.no_csv,
        json: !args.no_json,
    };

    let report = flattener.convert_file(&input, &super::expand(&args.output_dir), options)?;
    println!("Converted {} task(s)", report.records);
    for path in report.csv_path.iter().chain(report.json_path.iter()) {
        println!("  {}", path.display());
    }
    Ok(())
}

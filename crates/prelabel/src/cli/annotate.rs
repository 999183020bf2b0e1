//! The `prelabel annotate` command.

use clap::Args;
use prelabel_core::{
    AnnotateOptions, Config, OutputFormat, OutputWriter, Prelabel, RunSummary, TaskReport,
};
use std::path::Path;
use std::time::Instant;

/// Arguments for the `annotate` command.
#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Annotate at most this many tasks
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// Prompt strategy (see `prelabel strategies`)
    #[arg(short, long)]
    pub strategy: Option<String>,

    /// Provenance label stamped on every filled slot
    #[arg(long)]
    pub origin: Option<String>,

    /// Model identifier to request
    #[arg(short, long)]
    pub model: Option<String>,

    /// Maximum attempts per task
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Query and parse, print predictions to stdout, skip the upload
    #[arg(long)]
    pub dry_run: bool,
}

/// Execute the annotate command.
pub async fn execute(args: AnnotateArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    apply_overrides(&mut config, &args)?;

    let mut options = AnnotateOptions::from_config(&config.pipeline);
    options.dry_run = args.dry_run;

    let prelabel = Prelabel::new(config);
    let annotator = prelabel.annotator_with(options)?;
    annotator.check_provider().await?;
    let tasks = annotator.tasks().await?;
    if tasks.is_empty() {
        eprintln!("No tasks to annotate.");
        return Ok(());
    }

    let pb = create_progress_bar(tasks.len() as u64);
    let mut stdout = OutputWriter::new(std::io::stdout().lock(), OutputFormat::JsonLines, false);
    let start = Instant::now();

    let summary = annotator
        .run_tasks(&tasks, |report| {
            pb.inc(1);
            pb.set_message(format!("task {}", report.task_id));
            if args.dry_run {
                if let Err(e) = write_dry_run(&mut stdout, report) {
                    tracing::warn!("Failed to write prediction for task {}: {e}", report.task_id);
                }
            }
        })
        .await;

    pb.finish_and_clear();
    stdout.flush()?;
    print_summary(&summary, start.elapsed(), args.dry_run);
    Ok(())
}

/// Apply CLI overrides on top of the loaded config and re-validate.
fn apply_overrides(config: &mut Config, args: &AnnotateArgs) -> anyhow::Result<()> {
    if let Some(limit) = args.limit {
        config.pipeline.limit = limit;
    }
    if let Some(strategy) = &args.strategy {
        config.prompt.strategy = strategy.clone();
    }
    if let Some(origin) = &args.origin {
        config.prompt.origin = origin.clone();
    }
    if let Some(model) = &args.model {
        config.prompt.model = model.clone();
    }
    if let Some(max_retries) = args.max_retries {
        config.pipeline.max_retries = max_retries;
    }
    config.validate()?;
    Ok(())
}

fn write_dry_run<W: std::io::Write>(
    writer: &mut OutputWriter<W>,
    report: &TaskReport,
) -> std::io::Result<()> {
    match &report.prediction {
        Some(prediction) => writer.write(&serde_json::json!({
            "task_id": report.task_id,
            "attempts": report.attempts,
            "prediction": prediction,
        })),
        None => Ok(()),
    }
}

fn create_progress_bar(total: u64) -> indicatif::ProgressBar {
    use indicatif::{ProgressBar, ProgressStyle};

    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("##-"),
    );
    pb.set_message("starting...");
    pb
}

/// Print a formatted summary table after the run.
fn print_summary(summary: &RunSummary, elapsed: std::time::Duration, dry_run: bool) {
    eprintln!();
    eprintln!("  ====================================");
    eprintln!("               Summary");
    eprintln!("  ====================================");
    if dry_run {
        eprintln!("    Dry run:      {:>8}", summary.dry_run);
    } else {
        eprintln!("    Created:      {:>8}", summary.created);
        eprintln!("    Updated:      {:>8}", summary.updated);
    }
    for (label, count) in [
        ("Rejected:", summary.fatal),
        ("Exhausted:", summary.exhausted),
        ("No image:", summary.unresolved),
        ("Upload failed:", summary.upload_failed),
    ] {
        if count > 0 {
            eprintln!("    {label:<14}{count:>8}");
        }
    }
    eprintln!("  ------------------------------------");
    eprintln!("    Total:        {:>8}", summary.total);
    eprintln!("    Duration:     {:>7.1}s", elapsed.as_secs_f64());
    eprintln!("  ====================================");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> AnnotateArgs {
        AnnotateArgs {
            limit: None,
            strategy: None,
            origin: None,
            model: None,
            max_retries: None,
            dry_run: false,
        }
    }

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = Config::default();
        let args = AnnotateArgs {
            limit: Some(10),
            strategy: Some("multi_label".to_string()),
            origin: Some("gpt-4o-multi".to_string()),
            model: Some("gpt-4o-mini".to_string()),
            max_retries: Some(2),
            ..args()
        };
        apply_overrides(&mut config, &args).unwrap();
        assert_eq!(config.pipeline.limit, 10);
        assert_eq!(config.prompt.strategy, "multi_label");
        assert_eq!(config.prompt.origin, "gpt-4o-multi");
        assert_eq!(config.prompt.model, "gpt-4o-mini");
        assert_eq!(config.pipeline.max_retries, 2);
    }

    #[test]
    fn test_no_overrides_keeps_config() {
        let mut config = Config::default();
        apply_overrides(&mut config, &args()).unwrap();
        assert_eq!(config.prompt.strategy, "fenced_json");
        assert_eq!(config.pipeline.max_retries, 5);
    }

    #[test]
    fn test_unknown_strategy_override_fails_validation() {
        let mut config = Config::default();
        let args = AnnotateArgs {
            strategy: Some("Prompt_3".to_string()),
            ..args()
        };
        let err = apply_overrides(&mut config, &args).unwrap_err();
        assert!(err.to_string().contains("Prompt_3"));
    }

    #[test]
    fn test_dry_run_skips_reports_without_prediction() {
        let mut buffer = Vec::new();
        let mut writer = OutputWriter::new(&mut buffer, OutputFormat::JsonLines, false);
        let report = TaskReport {
            task_id: 4,
            outcome: prelabel_core::TaskOutcome::Exhausted,
            attempts: 5,
            prediction: None,
        };
        write_dry_run(&mut writer, &report).unwrap();
        assert!(buffer.is_empty());
    }
}

//! Logging initialization.
//!
//! Logs go to stderr so that stdout stays free for data (dry-run
//! predictions, `config show`).

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize the global subscriber.
///
/// `RUST_LOG` overrides the level chosen by `verbose`.
pub fn init(verbose: bool, json_format: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Initialize from the `[logging]` section, with CLI flags taking precedence.
pub fn init_from_config(
    config: &prelabel_core::Config,
    verbose_override: bool,
    json_logs_override: bool,
) {
    let (verbose, json_format) = resolve(config, verbose_override, json_logs_override);
    init(verbose, json_format);
}

fn resolve(config: &prelabel_core::Config, verbose: bool, json_logs: bool) -> (bool, bool) {
    let verbose = verbose || matches!(config.logging.level.as_str(), "debug" | "trace");
    let json_format = json_logs || config.logging.format == "json";
    (verbose, json_format)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = prelabel_core::Config::default();
        assert_eq!(resolve(&config, false, false), (false, false));
        assert_eq!(resolve(&config, true, true), (true, true));

        config.logging.level = "trace".to_string();
        config.logging.format = "json".to_string();
        assert_eq!(resolve(&config, false, false), (true, true));
    }
}

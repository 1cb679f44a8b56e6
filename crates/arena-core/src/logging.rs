//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays clean for command output. `RUST_LOG`
//! overrides the configured level.

use arena_config::LogConfig;
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` if set and valid, else `default_level`,
/// else `info`.
pub fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(config: &LogConfig) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.level))
        .with_writer(std::io::stderr)
        .with_target(false);
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Level implied by `-v` repetitions, overriding the configured one.
pub fn level_for_verbosity(verbose: u8, configured: &str) -> String {
    match verbose {
        0 => configured.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

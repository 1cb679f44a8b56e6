//! `arena` binary entry point.

use arena_config::resolve_config;
use arena_core::cli::{self, Cli};
use arena_core::exit_codes::ExitCode;
use arena_core::logging::{init_logging, level_for_verbosity};
use clap::Parser;

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let resolved = match resolve_config(&cli.global.overrides()) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("arena: {e}");
            return ExitCode::ConfigError.into();
        }
    };

    let mut log = resolved.config.log.clone();
    log.level = level_for_verbosity(cli.global.verbose, &log.level);
    log.json |= cli.global.log_json;
    init_logging(&log);
    tracing::debug!(
        config = ?resolved.source,
        data_dir = %resolved.data_dir.display(),
        "configuration resolved"
    );

    cli::run(&cli, &resolved).into()
}

//! CLI module for aerogate
//!
//! Provides command-line interface for:
//! - plan: compile a request against a schema file and print the plan
//! - schema: list the tables of a schema file

mod args;
mod commands;
mod errors;
mod io;

use tracing_subscriber::EnvFilter;

pub use args::{Cli, Command};
pub use commands::{describe, plan, run_command};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};

/// Install the tracing subscriber on stderr
///
/// `level` wins over `RUST_LOG`; with neither, only warnings are shown.
pub fn init_logging(level: Option<&str>, json: bool) -> CliResult<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level)
            .map_err(|e| CliError::config_error(format!("invalid log level: {}", e)))?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| CliError::config_error(format!("logging already initialized: {}", e)))
}

/// Parse arguments, set up logging, run the command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_level.as_deref(), cli.log_json)?;
    run_command(cli.command)
}

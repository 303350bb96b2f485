//! CLI argument definitions using clap
//!
//! Commands:
//! - aerogate plan --schema <path> --table <name> [--method GET] [--query ...]
//! - aerogate schema --schema <path>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// aerogate - schema-driven REST gateway over Postgres
#[derive(Parser, Debug)]
#[command(name = "aerogate")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "debug" or "aerogate=trace"
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile a request against a schema file and print the plan
    Plan {
        /// Gateway configuration; defaults apply when omitted
        #[arg(long)]
        config: Option<PathBuf>,

        /// Schema snapshot JSON file
        #[arg(long)]
        schema: PathBuf,

        /// Target table
        #[arg(long)]
        table: String,

        /// GET, POST, PATCH or DELETE
        #[arg(long, default_value = "GET")]
        method: String,

        /// Query string, e.g. "completed.eq=false&limit=10"
        #[arg(long, default_value = "")]
        query: String,

        /// JSON request body for POST/PATCH
        #[arg(long)]
        body: Option<String>,

        /// Prefer header value, e.g. "return=representation"
        #[arg(long)]
        prefer: Option<String>,

        /// Database schema the table lives in
        #[arg(long)]
        db_schema: Option<String>,
    },

    /// List tables, columns and foreign keys of a schema file
    Schema {
        /// Schema snapshot JSON file
        #[arg(long)]
        schema: PathBuf,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_defaults() {
        let cli = Cli::parse_from([
            "aerogate", "plan", "--schema", "s.json", "--table", "todos",
        ]);
        match cli.command {
            Command::Plan { method, query, .. } => {
                assert_eq!(method, "GET");
                assert_eq!(query, "");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_log_flags() {
        let cli = Cli::parse_from(["aerogate", "schema", "--schema", "s.json", "--log-json"]);
        assert!(cli.log_json);
    }
}

//! # CLI Interface
//!
//! Command-line structure for `vey-node`, built with `clap` derive. Every
//! flag that matters in a deployment also reads a `VEY_*` environment
//! variable.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// VEY address provider node.
///
/// Holds the address vault, issues address credentials, answers shipping
/// validations with zero-knowledge proofs, keeps waybills and tracking, and
/// resolves PIDs for authorized carriers.
#[derive(Parser, Debug)]
#[command(
    name = "vey-node",
    about = "VEY address provider node",
    version,
    propagate_version = true
)]
pub struct VeyNodeCli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the provider API.
    Run(RunArgs),
    /// Create the data directory and generate the provider secrets.
    Init(InitArgs),
    /// Query a running node's status endpoint.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Data directory holding the database, key files and access files.
    #[arg(long, short = 'd', env = "VEY_DATA_DIR", default_value = "./vey-data")]
    pub data_dir: PathBuf,

    /// Interface the API and metrics listeners bind to.
    #[arg(long, env = "VEY_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port for the REST API.
    #[arg(long, env = "VEY_API_PORT", default_value_t = 8740)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "VEY_METRICS_PORT", default_value_t = 8741)]
    pub metrics_port: u16,

    /// Access-control policy file. Defaults to `<data-dir>/policies.json`.
    #[arg(long, env = "VEY_POLICIES")]
    pub policies: Option<PathBuf>,

    /// Requester DID → roles file. Defaults to `<data-dir>/requesters.json`.
    #[arg(long, env = "VEY_REQUESTERS")]
    pub requesters: Option<PathBuf>,

    /// Default `tracing` filter when `RUST_LOG` is unset.
    #[arg(long, env = "VEY_LOG_LEVEL", default_value = "vey_node=info,vey_protocol=info,tower_http=info")]
    pub log_level: String,

    #[arg(long, env = "VEY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    #[arg(long, short = 'd', env = "VEY_DATA_DIR", default_value = "./vey-data")]
    pub data_dir: PathBuf,

    /// Overwrite existing key files. Every PID sealed under the old vault
    /// key becomes unreadable.
    #[arg(long)]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Base URL of the running node.
    #[arg(long, env = "VEY_API_URL", default_value = "http://127.0.0.1:8740")]
    pub api_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        VeyNodeCli::command().debug_assert();
    }

    #[test]
    fn run_defaults() {
        let cli = VeyNodeCli::parse_from(["vey-node", "run"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.api_port, 8740);
        assert_eq!(args.metrics_port, 8741);
        assert_eq!(args.log_format, LogFormat::Pretty);
        assert!(args.policies.is_none());
        assert!(args.requesters.is_none());
    }

    #[test]
    fn json_log_format_parses() {
        let cli = VeyNodeCli::parse_from(["vey-node", "run", "--log-format", "json", "--api-port", "9000"]);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.log_format, LogFormat::Json);
        assert_eq!(args.api_port, 9000);
    }
}

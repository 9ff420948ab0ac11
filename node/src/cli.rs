//! # CLI Interface
//!
//! Defines the command-line argument structure for `lucky-node` using
//! `clap` derive. Supports five subcommands: `run`, `init`, `keygen`,
//! `status` and `version`.
//!
//! Flags left unset fall back to the config file, then to built-in
//! defaults. See [`crate::config`].

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Lucky Shop node.
///
/// Hosts a Lucky Shop exchange on a single-writer chain, serves the REST
/// and WebSocket API and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "lucky-node",
    about = "Lucky Shop exchange node",
    version,
    propagate_version = true
)]
pub struct LuckyNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node.
    Run(RunArgs),
    /// Initialize a data directory: writes a default config file and a
    /// fresh administrator key.
    Init(InitArgs),
    /// Print a fresh keypair and its address.
    Keygen,
    /// Query the status of a running node via its API.
    Status(StatusArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug, Default)]
pub struct RunArgs {
    /// Path to the node configuration file (TOML).
    ///
    /// When omitted, the node looks for `config.toml` in the data directory.
    #[arg(long, short = 'c', env = "LUCKY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Data directory holding the chain store and the administrator key.
    #[arg(long, short = 'd', env = "LUCKY_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Port for the REST and WebSocket API.
    #[arg(long, env = "LUCKY_RPC_PORT")]
    pub rpc_port: Option<u16>,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "LUCKY_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Log output format: `pretty` or `json`.
    #[arg(long, env = "LUCKY_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Network name reported by `/status`: devnet, testnet or mainnet.
    #[arg(long, env = "LUCKY_NETWORK")]
    pub network: Option<String>,

    /// Initial token supply used when deploying a fresh shop.
    #[arg(long, env = "LUCKY_INITIAL_SUPPLY")]
    pub initial_supply: Option<u64>,

    /// Enable the devnet faucet regardless of the config file.
    #[arg(long)]
    pub faucet: bool,

    /// Hex-encoded Ed25519 administrator secret key.
    ///
    /// If not provided, the node reads `admin.key` from the data directory.
    /// **Never pass this flag in production**; use the key file instead.
    #[arg(long, env = "LUCKY_ADMIN_KEY")]
    pub admin_key: Option<String>,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "LUCKY_DATA_DIR", default_value = "~/.lucky")]
    pub data_dir: PathBuf,

    /// Network to configure for: mainnet, testnet, or devnet.
    #[arg(long, default_value = "devnet")]
    pub network: String,

    /// Overwrite an existing administrator key.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `status` subcommand.
#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// API endpoint of the running node.
    #[arg(long, default_value = "http://127.0.0.1:9841")]
    pub rpc_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        LuckyNodeCli::command().debug_assert();
    }

    #[test]
    fn run_flags_are_optional() {
        let cli = LuckyNodeCli::try_parse_from(["lucky-node", "run"]).unwrap();
        match cli.command {
            Commands::Run(args) => assert!(!args.faucet),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn run_parses_overrides() {
        let cli = LuckyNodeCli::try_parse_from([
            "lucky-node",
            "run",
            "--rpc-port",
            "18000",
            "--initial-supply",
            "100",
            "--faucet",
        ])
        .unwrap();
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.rpc_port, Some(18000));
        assert_eq!(args.initial_supply, Some(100));
        assert!(args.faucet);
    }
}

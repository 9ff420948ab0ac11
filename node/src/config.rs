//! # Node Configuration
//!
//! TOML configuration for `lucky-node`. Values resolve in three layers:
//! built-in defaults, then the config file, then CLI flags and their
//! environment variables.
//!
//! ```toml
//! [node]
//! data_dir = "~/.lucky"
//! rpc_port = 9841
//! metrics_port = 9842
//! log_format = "pretty"
//! network = "devnet"
//!
//! [shop]
//! initial_supply = 1000000
//! faucet_enabled = true
//! faucet_limit = 1000000
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use lucky_protocol::config::{
    DEFAULT_FAUCET_LIMIT, DEFAULT_INITIAL_SUPPLY, DEFAULT_METRICS_PORT, DEFAULT_RPC_PORT,
};

use crate::cli::RunArgs;
use crate::logging::LogFormat;

/// File name looked up inside the data directory when `--config` is absent.
pub const CONFIG_FILE_NAME: &str = "config.toml";

const NETWORKS: [&str; 3] = ["devnet", "testnet", "mainnet"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub node: NodeSection,
    pub shop: ShopSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeSection {
    pub data_dir: PathBuf,
    pub rpc_port: u16,
    pub metrics_port: u16,
    pub log_format: String,
    /// Default `EnvFilter` directives; `RUST_LOG` still wins.
    pub log_level: String,
    pub network: String,
}

impl Default for NodeSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("~/.lucky"),
            rpc_port: DEFAULT_RPC_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            log_format: "pretty".into(),
            log_level: "lucky_node=info,lucky_contracts=info,lucky_protocol=info,tower_http=debug".into(),
            network: "devnet".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopSection {
    /// Tokens minted to the shop when a fresh chain is deployed.
    pub initial_supply: u64,
    pub faucet_enabled: bool,
    /// Largest amount a single faucet request may credit.
    pub faucet_limit: u64,
}

impl Default for ShopSection {
    fn default() -> Self {
        Self {
            initial_supply: DEFAULT_INITIAL_SUPPLY,
            faucet_enabled: true,
            faucet_limit: DEFAULT_FAUCET_LIMIT,
        }
    }
}

impl NodeConfig {
    /// Reads and parses a config file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("invalid TOML in config file {}", path.display()))
    }

    /// Resolves the effective configuration for `run`.
    ///
    /// An explicit `--config` must exist. Otherwise `config.toml` in the
    /// data directory is used when present.
    pub fn resolve(args: &RunArgs) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::load_from_file(&expand_home(path))?,
            None => {
                let data_dir = args
                    .data_dir
                    .clone()
                    .unwrap_or_else(|| NodeSection::default().data_dir);
                let candidate = expand_home(&data_dir).join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    Self::load_from_file(&candidate)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_overrides(args);
        config.node.data_dir = expand_home(&config.node.data_dir);
        config.validate()?;
        Ok(config)
    }

    /// Applies CLI flags on top of whatever the file said.
    pub fn apply_overrides(&mut self, args: &RunArgs) {
        if let Some(dir) = &args.data_dir {
            self.node.data_dir = dir.clone();
        }
        if let Some(port) = args.rpc_port {
            self.node.rpc_port = port;
        }
        if let Some(port) = args.metrics_port {
            self.node.metrics_port = port;
        }
        if let Some(format) = &args.log_format {
            self.node.log_format = format.clone();
        }
        if let Some(network) = &args.network {
            self.node.network = network.clone();
            if network == "mainnet" {
                self.shop.faucet_enabled = false;
            }
        }
        if let Some(supply) = args.initial_supply {
            self.shop.initial_supply = supply;
        }
        if args.faucet {
            self.shop.faucet_enabled = true;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.rpc_port == self.node.metrics_port {
            bail!(
                "rpc_port and metrics_port must differ (both are {})",
                self.node.rpc_port
            );
        }
        if !NETWORKS.contains(&self.node.network.as_str()) {
            bail!(
                "unknown network '{}', expected one of {:?}",
                self.node.network,
                NETWORKS
            );
        }
        if !matches!(self.node.log_format.to_lowercase().as_str(), "pretty" | "json") {
            bail!("log_format must be 'pretty' or 'json', got '{}'", self.node.log_format);
        }
        if self.shop.faucet_enabled && self.node.network == "mainnet" {
            bail!("the faucet cannot be enabled on mainnet");
        }
        if self.shop.faucet_enabled && self.shop.faucet_limit == 0 {
            bail!("faucet_limit must be greater than zero when the faucet is enabled");
        }
        Ok(())
    }

    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_str_lossy(&self.node.log_format)
    }

    /// Faucet limit when the faucet is on.
    pub fn faucet_limit(&self) -> Option<u64> {
        self.shop.faucet_enabled.then_some(self.shop.faucet_limit)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render config as TOML")
    }
}

/// Expands a leading `~` to `$HOME`. Other paths are returned unchanged.
pub fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(rest),
        None => path.to_path_buf(),
    }
}

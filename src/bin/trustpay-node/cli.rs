//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use trustpay_node::config::NodeConfig;

/// Invoice payment confirmation node with on-chain proof verification.
#[derive(Parser, Debug)]
#[command(name = "trustpay-node")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// HTTP listen address.
    #[arg(long, short, env = "TRUSTPAY_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// SQLite database file (`:memory:` for a throwaway database).
    #[arg(long, env = "TRUSTPAY_DATABASE")]
    pub database: Option<PathBuf>,

    /// JSON-RPC endpoint of the chain node.
    #[arg(long, env = "TRUSTPAY_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Address of the payment-proof contract.
    #[arg(long, env = "TRUSTPAY_CONTRACT_ADDRESS")]
    pub contract_address: Option<String>,

    /// Base URL of the risk scoring service.
    #[arg(long, env = "TRUSTPAY_RISK_URL")]
    pub risk_url: Option<String>,

    /// Base URL of the auth service.
    #[arg(long, env = "TRUSTPAY_AUTH_URL")]
    pub auth_url: Option<String>,

    /// Log level.
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    pub log_level: String,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", env = "TRUSTPAY_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human readable.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Convert CLI arguments into a NodeConfig.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<NodeConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            NodeConfig::from_file(path)?
        } else {
            NodeConfig::default()
        };

        // Override with CLI arguments
        if let Some(listen) = self.listen {
            config.listen_addr = listen;
        }
        if let Some(database) = self.database {
            config.database_path = database;
        }
        if let Some(rpc_url) = self.rpc_url {
            config.chain.rpc_url = rpc_url;
        }
        if let Some(contract_address) = self.contract_address {
            config.chain.contract_address = contract_address;
        }
        if self.risk_url.is_some() {
            config.risk.url = self.risk_url;
        }
        if self.auth_url.is_some() {
            config.auth.url = self.auth_url;
        }
        config.log_level = self.log_level;

        Ok(config)
    }
}

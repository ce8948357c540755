//! Configuration for trustpay-node.

use crate::auth::Role;
use crate::chain::RECORD_PAYMENT_SIGNATURE;
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Database path that keeps everything in memory.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

/// Node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// HTTP listen address.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// SQLite database file, or `:memory:`.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Chain node and payment-proof contract.
    #[serde(default)]
    pub chain: ChainConfig,

    /// Risk scoring endpoint.
    #[serde(default)]
    pub risk: RiskConfig,

    /// Caller authentication.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Maximum number of idle per-reference locks kept around.
    #[serde(default = "default_lock_capacity")]
    pub lock_capacity: usize,
}

/// Chain verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint of the chain node.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Address of the payment-proof contract.
    #[serde(default)]
    pub contract_address: String,

    /// Signature of the payment-recording function.
    #[serde(default = "default_function_signature")]
    pub function_signature: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_chain_timeout")]
    pub timeout_secs: u64,
}

/// Risk scoring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Base URL of an external scoring service. When unset the built-in
    /// rule-based model is used.
    #[serde(default)]
    pub url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_risk_timeout")]
    pub timeout_secs: u64,
}

/// Authentication configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of a remote auth service exposing `GET /auth/me`. Takes
    /// precedence over `tokens`.
    #[serde(default)]
    pub url: Option<String>,

    /// Static bearer tokens.
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// A statically configured bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// The token value.
    pub token: String,
    /// User the token authenticates as.
    pub user_id: i64,
    /// Role of that user.
    #[serde(default)]
    pub role: Role,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            database_path: default_database_path(),
            log_level: default_log_level(),
            chain: ChainConfig::default(),
            risk: RiskConfig::default(),
            auth: AuthConfig::default(),
            lock_capacity: default_lock_capacity(),
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            contract_address: String::new(),
            function_signature: default_function_signature(),
            timeout_secs: default_chain_timeout(),
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: default_risk_timeout(),
        }
    }
}

impl ChainConfig {
    /// Parse the configured contract address.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the address is missing or malformed.
    pub fn contract_address(&self) -> crate::Result<Address> {
        if self.contract_address.trim().is_empty() {
            return Err(crate::Error::Config(
                "chain.contract_address is not set".to_string(),
            ));
        }
        self.contract_address.trim().parse().map_err(|e| {
            crate::Error::Config(format!(
                "invalid chain.contract_address {:?}: {e}",
                self.contract_address
            ))
        })
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 4000))
}

fn default_database_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "trustpay")
        .map(|dirs| dirs.data_dir().join("trustpay.db"))
        .unwrap_or_else(|| PathBuf::from(".trustpay/trustpay.db"))
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_function_signature() -> String {
    RECORD_PAYMENT_SIGNATURE.to_string()
}

const fn default_chain_timeout() -> u64 {
    10
}

const fn default_risk_timeout() -> u64 {
    3
}

const fn default_lock_capacity() -> usize {
    1024
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &std::path::Path) -> crate::Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| crate::Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Whether the database lives only in memory.
    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == IN_MEMORY_DATABASE
    }
}

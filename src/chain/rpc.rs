//! Read-only Ethereum JSON-RPC access.
//!
//! Node responses are mapped at this boundary into typed [`TxReceipt`] and
//! [`ChainTransaction`] values; anything the node returns that does not fit is
//! an [`Error::Upstream`], never a verification outcome.

use crate::error::{Error, Result};
use crate::types::TxHash;
use alloy_primitives::Address;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Execution outcome of a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// `1` for success, `0` for revert. Absent on pre-Byzantium receipts.
    pub status: Option<u64>,
    /// Block the transaction was mined in.
    pub block_number: Option<u64>,
}

impl TxReceipt {
    /// Whether execution succeeded.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.status == Some(1)
    }
}

/// A transaction as returned by `eth_getTransactionByHash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainTransaction {
    /// Sender.
    pub from: Address,
    /// Destination; `None` for contract creation.
    pub to: Option<Address>,
    /// Call data.
    pub input: Vec<u8>,
    /// Block the transaction was mined in, if mined.
    pub block_number: Option<u64>,
}

/// Read access to chain state needed by the verifier.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Fetch the receipt; `None` if unknown or not yet mined.
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>>;

    /// Fetch the full transaction; `None` if unknown.
    async fn transaction(&self, tx_hash: &TxHash) -> Result<Option<ChainTransaction>>;

    /// Fetch a block's timestamp in unix seconds; `None` if unknown.
    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    status: Option<String>,
    block_number: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTransaction {
    from: String,
    to: Option<String>,
    #[serde(default)]
    input: String,
    block_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawBlockHeader {
    timestamp: String,
}

/// Parse a hex quantity such as `0x1b4`.
///
/// # Errors
///
/// Returns `Error::Upstream` if the value is not a `0x`-prefixed hex number.
pub fn parse_quantity(value: &str) -> Result<u64> {
    let digits = value
        .strip_prefix("0x")
        .ok_or_else(|| Error::Upstream(format!("malformed quantity from node: {value}")))?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| Error::Upstream(format!("malformed quantity from node: {value}: {e}")))
}

fn parse_address(value: &str) -> Result<Address> {
    value
        .parse::<Address>()
        .map_err(|e| Error::Upstream(format!("malformed address from node: {value}: {e}")))
}

impl TryFrom<RawReceipt> for TxReceipt {
    type Error = Error;

    fn try_from(raw: RawReceipt) -> Result<Self> {
        Ok(Self {
            status: raw.status.as_deref().map(parse_quantity).transpose()?,
            block_number: raw.block_number.as_deref().map(parse_quantity).transpose()?,
        })
    }
}

impl TryFrom<RawTransaction> for ChainTransaction {
    type Error = Error;

    fn try_from(raw: RawTransaction) -> Result<Self> {
        let input = hex::decode(raw.input.trim_start_matches("0x"))
            .map_err(|e| Error::Upstream(format!("malformed call data from node: {e}")))?;
        Ok(Self {
            from: parse_address(&raw.from)?,
            to: raw.to.as_deref().map(parse_address).transpose()?,
            input,
            block_number: raw.block_number.as_deref().map(parse_quantity).transpose()?,
        })
    }
}

/// [`ChainReader`] over HTTP JSON-RPC.
#[derive(Debug)]
pub struct JsonRpcChainReader {
    http_client: reqwest::Client,
    rpc_url: String,
    request_id: AtomicU64,
}

impl JsonRpcChainReader {
    /// Create a reader for the given node URL.
    ///
    /// Every call is bounded by `timeout`; a timed-out call is an upstream error.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(rpc_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(5)))
            .build()
            .map_err(|e| Error::Config(format!("failed to build RPC client: {e}")))?;

        Ok(Self {
            http_client,
            rpc_url: rpc_url.into(),
            request_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<Option<T>> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        debug!("[RPC] >>> {} (id={})", method, id);

        let response = self
            .http_client
            .post(&self.rpc_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                // The URL may carry an API key.
                let e = e.without_url();
                if e.is_timeout() {
                    warn!("[RPC] {} timed out", method);
                    Error::Upstream(format!("chain node timed out on {method}"))
                } else {
                    warn!("[RPC] transport error calling {}: {}", method, e);
                    Error::Upstream(format!("chain node unreachable: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!(
                "chain node returned HTTP {status} for {method}"
            )));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| {
                Error::Upstream(format!("malformed JSON-RPC response: {}", e.without_url()))
            })?;

        if let Some(err) = body.error {
            return Err(Error::Upstream(format!(
                "JSON-RPC error {} on {}: {}",
                err.code, method, err.message
            )));
        }

        match body.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Upstream(format!("malformed {method} result: {e}"))),
        }
    }
}

#[async_trait]
impl ChainReader for JsonRpcChainReader {
    async fn transaction_receipt(&self, tx_hash: &TxHash) -> Result<Option<TxReceipt>> {
        self.call::<RawReceipt>("eth_getTransactionReceipt", json!([tx_hash.as_str()]))
            .await?
            .map(TxReceipt::try_from)
            .transpose()
    }

    async fn transaction(&self, tx_hash: &TxHash) -> Result<Option<ChainTransaction>> {
        self.call::<RawTransaction>("eth_getTransactionByHash", json!([tx_hash.as_str()]))
            .await?
            .map(ChainTransaction::try_from)
            .transpose()
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<Option<u64>> {
        self.call::<RawBlockHeader>(
            "eth_getBlockByNumber",
            json!([format!("{block_number:#x}"), false]),
        )
        .await?
        .map(|header| parse_quantity(&header.timestamp))
        .transpose()
    }
}

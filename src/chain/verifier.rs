//! Chain verifier: a pure validation oracle over chain state.
//!
//! Given a transaction hash and the expected `(reference, amount)`, confirms
//! the transaction was mined successfully, targeted the payment-proof
//! contract, and encoded a matching `recordPayment` call.
//!
//! ```text
//! receipt? ──no──► NotFound
//!    │
//! status==1? ──no──► Reverted
//!    │
//! transaction? ──no──► DetailsUnavailable
//!    │
//! to == contract? ──no──► WrongTarget
//!    │
//! decode input ──err──► DecodeFailed / FunctionMismatch
//!    │
//! reference == expected? ──no──► ReferenceMismatch
//!    │
//! amount == expected? ──no──► AmountMismatch
//!    │
//!    ▼
//! Verified
//! ```
//!
//! Steps run in that order and the first failure wins. There are no retries
//! and no writes.

use crate::chain::abi::{
    decode_record_payment, normalize_signature, selector_for, CallDecodeError,
    RECORD_PAYMENT_NAME, RECORD_PAYMENT_SIGNATURE,
};
use crate::chain::rpc::{ChainReader, JsonRpcChainReader};
use crate::config::ChainConfig;
use crate::error::{Error, Result};
use crate::types::{Amount, TxHash};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Why a transaction failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Unknown to the chain, or not yet mined.
    NotFound,
    /// Mined but execution reverted.
    Reverted,
    /// Receipt exists but the transaction body is unavailable.
    DetailsUnavailable,
    /// Sent somewhere other than the payment-proof contract.
    WrongTarget,
    /// Call data could not be decoded.
    DecodeFailed,
    /// Call data is for a different function.
    FunctionMismatch,
    /// Decoded reference differs from the invoice's.
    ReferenceMismatch,
    /// Decoded amount differs from the invoice's.
    AmountMismatch,
}

impl FailureReason {
    /// Stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Reverted => "reverted",
            Self::DetailsUnavailable => "details_unavailable",
            Self::WrongTarget => "wrong_target",
            Self::DecodeFailed => "decode_failed",
            Self::FunctionMismatch => "function_mismatch",
            Self::ReferenceMismatch => "reference_mismatch",
            Self::AmountMismatch => "amount_mismatch",
        }
    }

    /// Human-readable reason.
    #[must_use]
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotFound => "Transaction not found / not mined yet",
            Self::Reverted => "Transaction reverted",
            Self::DetailsUnavailable => "Transaction details not available",
            Self::WrongTarget => "Tx was not sent to PaymentProof contract",
            Self::DecodeFailed => "Tx input is not a recordPayment call (decode failed)",
            Self::FunctionMismatch => "Tx is not recordPayment(...)",
            Self::ReferenceMismatch => "reference mismatch vs tx input",
            Self::AmountMismatch => "amount mismatch vs tx input",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// A negative verification result with diagnostic fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// Which check failed.
    pub reason: FailureReason,
    /// The transaction that was checked.
    pub tx_hash: String,
    /// Diagnostic fields, e.g. expected vs. observed values.
    pub details: BTreeMap<&'static str, String>,
}

impl Rejection {
    /// Create a rejection without diagnostics.
    #[must_use]
    pub fn new(reason: FailureReason, tx_hash: impl Into<String>) -> Self {
        Self {
            reason,
            tx_hash: tx_hash.into(),
            details: BTreeMap::new(),
        }
    }

    /// Attach a diagnostic field.
    #[must_use]
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.details.insert(key, value.into());
        self
    }

    /// JSON form returned to callers.
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("verified".into(), Value::Bool(false));
        map.insert("code".into(), Value::from(self.reason.code()));
        map.insert("reason".into(), Value::from(self.reason.message()));
        map.insert("txHash".into(), Value::from(self.tx_hash.clone()));
        for (key, value) in &self.details {
            map.insert((*key).to_string(), Value::from(value.clone()));
        }
        Value::Object(map)
    }
}

/// Details of a verified transaction, kept for audit display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDetails {
    /// Always `true`.
    pub verified: bool,
    /// The verified transaction.
    pub tx_hash: String,
    /// Reference decoded from the call.
    pub reference: String,
    /// Amount decoded from the call, as a decimal string.
    pub amount: String,
    /// Block the transaction was mined in.
    pub block_number: u64,
    /// Sender.
    pub from: Address,
    /// Destination (the payment-proof contract).
    pub to: Address,
    /// Block timestamp in unix seconds, when the node provided it.
    pub timestamp: Option<u64>,
}

/// Result of [`ChainVerifier::verify`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Every check passed.
    Verified(ChainDetails),
    /// A check failed.
    Rejected(Rejection),
}

impl VerificationOutcome {
    /// Whether verification succeeded.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    /// The failure reason, if rejected.
    #[must_use]
    pub fn reason(&self) -> Option<FailureReason> {
        match self {
            Self::Verified(_) => None,
            Self::Rejected(rejection) => Some(rejection.reason),
        }
    }

    /// JSON form returned to callers.
    ///
    /// # Errors
    ///
    /// Returns an error if the details cannot be serialized.
    pub fn to_json(&self) -> Result<Value> {
        match self {
            Self::Verified(details) => Ok(serde_json::to_value(details)?),
            Self::Rejected(rejection) => Ok(rejection.to_json()),
        }
    }
}

/// Verifies payment transactions against invoices.
pub struct ChainVerifier {
    reader: Arc<dyn ChainReader>,
    contract_address: Address,
    selector: [u8; 4],
}

impl ChainVerifier {
    /// Create a verifier over any [`ChainReader`].
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if `function_signature` is not the
    /// payment-recording function this verifier knows how to decode.
    pub fn new(
        reader: Arc<dyn ChainReader>,
        contract_address: Address,
        function_signature: &str,
    ) -> Result<Self> {
        let signature = normalize_signature(function_signature);
        if signature != RECORD_PAYMENT_SIGNATURE {
            return Err(Error::Config(format!(
                "unsupported function signature {function_signature:?}, expected {RECORD_PAYMENT_SIGNATURE}"
            )));
        }

        info!(
            "Chain verifier initialized (contract={}, function={})",
            contract_address, signature
        );

        Ok(Self {
            reader,
            contract_address,
            selector: selector_for(&signature),
        })
    }

    /// Create a verifier talking JSON-RPC to the configured node.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for an invalid contract address or signature.
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        let contract_address = config.contract_address()?;
        let reader = JsonRpcChainReader::new(
            config.rpc_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )?;
        Self::new(Arc::new(reader), contract_address, &config.function_signature)
    }

    /// The configured payment-proof contract.
    #[must_use]
    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    /// Verify a transaction against an expected reference and amount.
    ///
    /// # Errors
    ///
    /// Returns `Error::Upstream` when the chain node is unreachable, times out
    /// or answers with something malformed. A transaction that fails a check is
    /// `Ok(VerificationOutcome::Rejected)`, not an error.
    pub async fn verify(
        &self,
        tx_hash: &TxHash,
        expected_reference: &str,
        expected_amount: &Amount,
    ) -> Result<VerificationOutcome> {
        let hash = tx_hash.as_str();
        let reject = |reason| Rejection::new(reason, hash);

        // 1. Receipt must exist.
        let Some(receipt) = self.reader.transaction_receipt(tx_hash).await? else {
            debug!("{} has no receipt", hash);
            return Ok(VerificationOutcome::Rejected(reject(FailureReason::NotFound)));
        };

        // 2. Execution must have succeeded.
        if !receipt.succeeded() {
            return Ok(VerificationOutcome::Rejected(
                reject(FailureReason::Reverted)
                    .with("status", receipt.status.map_or("none".into(), |s| s.to_string())),
            ));
        }

        // 3. Transaction body is needed for the call data.
        let Some(tx) = self.reader.transaction(tx_hash).await? else {
            return Ok(VerificationOutcome::Rejected(reject(
                FailureReason::DetailsUnavailable,
            )));
        };

        // 4. Must target the payment-proof contract.
        let expected_to = self.contract_address;
        let Some(actual_to) = tx.to.filter(|to| *to == expected_to) else {
            return Ok(VerificationOutcome::Rejected(
                reject(FailureReason::WrongTarget)
                    .with("expectedTo", expected_to.to_string().to_lowercase())
                    .with(
                        "actualTo",
                        tx.to.map(|a| a.to_string().to_lowercase()).unwrap_or_default(),
                    ),
            ));
        };

        // 5. Must be a recordPayment call.
        let call = match decode_record_payment(&tx.input, self.selector) {
            Ok(call) => call,
            Err(CallDecodeError::WrongSelector(found)) => {
                return Ok(VerificationOutcome::Rejected(
                    reject(FailureReason::FunctionMismatch)
                        .with("expectedFunction", RECORD_PAYMENT_NAME)
                        .with("decodedSelector", format!("0x{}", hex::encode(found))),
                ));
            }
            Err(CallDecodeError::TooShort(len)) => {
                return Ok(VerificationOutcome::Rejected(
                    reject(FailureReason::DecodeFailed)
                        .with("details", format!("call data is {len} bytes, no selector")),
                ));
            }
            Err(CallDecodeError::Malformed(e)) => {
                return Ok(VerificationOutcome::Rejected(
                    reject(FailureReason::DecodeFailed).with("details", e),
                ));
            }
        };

        // 6. Reference must match exactly.
        if call.reference != expected_reference {
            return Ok(VerificationOutcome::Rejected(
                reject(FailureReason::ReferenceMismatch)
                    .with("reference", expected_reference)
                    .with("onTx", call.reference),
            ));
        }

        // 7. Amount must match as a canonical decimal string.
        let decoded_amount = call.amount.to_string();
        if decoded_amount != expected_amount.as_str() {
            return Ok(VerificationOutcome::Rejected(
                reject(FailureReason::AmountMismatch)
                    .with("amount", expected_amount.as_str())
                    .with("onTx", decoded_amount),
            ));
        }

        let block_number = receipt.block_number.or(tx.block_number).unwrap_or_default();
        let timestamp = match self.reader.block_timestamp(block_number).await {
            Ok(ts) => ts,
            Err(e) => {
                warn!("Could not read timestamp of block {}: {}", block_number, e);
                None
            }
        };

        info!(
            "Verified {} for {} (block {}, from {})",
            hash, expected_reference, block_number, tx.from
        );

        Ok(VerificationOutcome::Verified(ChainDetails {
            verified: true,
            tx_hash: hash.to_string(),
            reference: call.reference,
            amount: decoded_amount,
            block_number,
            from: tx.from,
            to: actual_to,
            timestamp,
        }))
    }
}

//! On-chain payment verification.
//!
//! - [`abi`]: the payment-proof contract's `recordPayment` call
//! - [`rpc`]: read-only JSON-RPC access behind the [`ChainReader`] trait
//! - [`verifier`]: the ordered checks producing a [`VerificationOutcome`]

pub mod abi;
pub mod rpc;
pub mod verifier;

pub use abi::{RECORD_PAYMENT_NAME, RECORD_PAYMENT_SIGNATURE};
pub use rpc::{ChainReader, ChainTransaction, JsonRpcChainReader, TxReceipt};
pub use verifier::{ChainDetails, ChainVerifier, FailureReason, Rejection, VerificationOutcome};

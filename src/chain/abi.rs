//! ABI knowledge of the payment-proof contract.
//!
//! Verification only needs the one mutating entry point; no on-chain state is
//! read.

use alloy_primitives::keccak256;
use alloy_sol_types::{sol, SolCall};

sol! {
    /// Records a payment proof for an invoice reference.
    function recordPayment(string reference, uint256 amount, string auxHash);
}

/// Canonical signature of the payment-recording function.
pub const RECORD_PAYMENT_SIGNATURE: &str = <recordPaymentCall as SolCall>::SIGNATURE;

/// Human-readable name of the payment-recording function.
pub const RECORD_PAYMENT_NAME: &str = "recordPayment";

/// Why call data could not be read as a `recordPayment` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallDecodeError {
    /// Fewer than four bytes of input, so there is no selector.
    TooShort(usize),
    /// The selector belongs to some other function.
    WrongSelector([u8; 4]),
    /// The selector matched but the arguments did not decode.
    Malformed(String),
}

/// Compute the four-byte selector of a function signature.
#[must_use]
pub fn selector_for(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Strip whitespace so `recordPayment(string, uint256, string)` compares equal
/// to the canonical form.
#[must_use]
pub fn normalize_signature(signature: &str) -> String {
    signature.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Decode transaction input as a `recordPayment` call with the given selector.
///
/// # Errors
///
/// Returns a [`CallDecodeError`] describing which part of the input was wrong.
pub fn decode_record_payment(
    input: &[u8],
    selector: [u8; 4],
) -> Result<recordPaymentCall, CallDecodeError> {
    if input.len() < 4 {
        return Err(CallDecodeError::TooShort(input.len()));
    }
    let (head, args) = input.split_at(4);
    if head != selector {
        let mut found = [0u8; 4];
        found.copy_from_slice(head);
        return Err(CallDecodeError::WrongSelector(found));
    }
    recordPaymentCall::abi_decode_raw(args, true)
        .map_err(|e| CallDecodeError::Malformed(e.to_string()))
}

/// Encode a `recordPayment` call. Used by tooling and tests.
#[must_use]
pub fn encode_record_payment(
    reference: &str,
    amount: alloy_primitives::U256,
    aux_hash: &str,
) -> Vec<u8> {
    recordPaymentCall {
        reference: reference.to_string(),
        amount,
        auxHash: aux_hash.to_string(),
    }
    .abi_encode()
}

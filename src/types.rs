//! Domain types shared by the store, the verifier and the orchestrator.

use crate::error::{Error, Result};
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Sentinel payer recorded when no wallet is known.
pub const UNKNOWN_PAYER: &str = "0xUNKNOWN";

/// Error returned when a stored enum string is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised {kind}: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

/// Invoice lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvoiceStatus {
    /// Created, no payment attempt yet.
    Pending,
    /// A pre-verification payment attempt was recorded.
    Processing,
    /// Confirmed on chain. Terminal.
    Verified,
    /// Failed outside the confirmation pipeline.
    Failed,
}

impl InvoiceStatus {
    /// Storage / wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Processing => "PROCESSING",
            Self::Verified => "VERIFIED",
            Self::Failed => "FAILED",
        }
    }

    /// Only PENDING and FAILED invoices may be deleted; the rest keep their
    /// audit trail.
    #[must_use]
    pub fn is_deletable(&self) -> bool {
        matches!(self, Self::Pending | Self::Failed)
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "PROCESSING" => Ok(Self::Processing),
            "VERIFIED" => Ok(Self::Verified),
            "FAILED" => Ok(Self::Failed),
            other => Err(ParseEnumError {
                kind: "invoice status",
                value: other.to_string(),
            }),
        }
    }
}

/// Advisory risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Low risk.
    Low,
    /// Medium risk.
    Medium,
    /// High risk.
    High,
}

impl RiskLevel {
    /// Storage / wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            other => Err(ParseEnumError {
                kind: "risk level",
                value: other.to_string(),
            }),
        }
    }
}

/// A positive decimal amount kept in canonical string form.
///
/// Amounts are never converted to floating point: the on-chain comparison is
/// an exact string match against the decoded `uint256`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Amount(String);

impl Amount {
    /// Parse and canonicalize a decimal string.
    ///
    /// Leading zeros of the integer part and trailing zeros of the fraction
    /// are dropped, so `"02500.00"` becomes `"2500"`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for empty, non-decimal, zero or negative input.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        let (int_part, frac_part) = s.split_once('.').unwrap_or((s, ""));

        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(Error::Validation("amount required".to_string()));
        }
        if !all_digits(int_part) || !all_digits(frac_part) {
            return Err(Error::Validation(format!("invalid amount: {s}")));
        }

        let int_part = match int_part.trim_start_matches('0') {
            "" => "0",
            trimmed => trimmed,
        };
        let frac_part = frac_part.trim_end_matches('0');

        let canonical = if frac_part.is_empty() {
            int_part.to_string()
        } else {
            format!("{int_part}.{frac_part}")
        };

        if canonical == "0" {
            return Err(Error::Validation("amount must be positive".to_string()));
        }
        Ok(Self(canonical))
    }

    /// Canonical decimal string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the amount is greater than or equal to a whole-unit threshold.
    #[must_use]
    pub fn is_at_least(&self, threshold: u64) -> bool {
        let whole = self.0.split('.').next().unwrap_or("0");
        let threshold = threshold.to_string();
        if whole.len() == threshold.len() {
            whole >= threshold.as_str()
        } else {
            whole.len() > threshold.len()
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Amount {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for Amount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        // Clients send either `"2500"` or `2500`; numbers go through their
        // textual form so large integers keep every digit.
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(serde_json::Number),
        }

        let text = match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text,
            Raw::Number(number) => number.to_string(),
        };
        Self::parse(&text).map_err(serde::de::Error::custom)
    }
}

/// A transaction hash: `0x` followed by 64 hex digits, kept lower-case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TxHash(String);

impl TxHash {
    /// Length of a hash including the `0x` prefix.
    pub const LEN: usize = 66;

    /// Validate a transaction hash.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` unless the input is `0x` + 64 hex digits.
    pub fn parse(input: &str) -> Result<Self> {
        let s = input.trim();
        let valid = s.len() == Self::LEN
            && s.starts_with("0x")
            && s[2..].bytes().all(|b| b.is_ascii_hexdigit());
        if !valid {
            return Err(Error::Validation("tx_hash (0x...) required".to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Hex string with `0x` prefix.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A persisted invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Invoice {
    /// Internal numeric id.
    pub id: i64,
    /// Business-facing unique reference.
    pub reference: String,
    /// Owning customer.
    pub customer_id: i64,
    /// Free-form description.
    pub description: String,
    /// Amount due.
    pub amount: Amount,
    /// ISO currency code.
    pub currency: String,
    /// Lifecycle status.
    pub status: InvoiceStatus,
    /// Creation time (UTC).
    pub created_at: NaiveDateTime,
}

/// One payment attempt. The highest id per invoice is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Payment {
    /// Row id.
    pub id: i64,
    /// Owning invoice.
    pub invoice_id: i64,
    /// Wallet the payer claimed.
    pub payer_wallet: String,
    /// Recorded transaction hash.
    pub tx_hash: Option<String>,
    /// Sender address observed on chain.
    pub chain_payer: Option<String>,
    /// Block timestamp observed on chain.
    pub chain_timestamp: Option<String>,
    /// Advisory risk score.
    pub risk_score: Option<i64>,
    /// Advisory risk level.
    pub risk_level: Option<RiskLevel>,
    /// Ordered reasons behind the score.
    pub risk_reasons: Vec<String>,
    /// Creation time (UTC).
    pub created_at: NaiveDateTime,
}

impl Payment {
    /// Whether this row still lacks a risk assessment.
    #[must_use]
    pub fn is_unscored(&self) -> bool {
        self.risk_score.is_none() && self.risk_level.is_none()
    }
}

/// An invoice joined with its latest payment's risk fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceView {
    /// The invoice itself.
    #[serde(flatten)]
    pub invoice: Invoice,
    /// Risk score of the latest payment, if any.
    pub risk_score: Option<i64>,
    /// Risk level of the latest payment, if any.
    pub risk_level: Option<RiskLevel>,
}

/// Advisory risk assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Score in `0..=100`.
    #[serde(rename = "risk_score")]
    pub score: i64,
    /// Level derived from the score.
    #[serde(rename = "risk_level")]
    pub level: RiskLevel,
    /// Ordered reasons.
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    /// Conservative assessment used whenever scoring during confirmation fails.
    #[must_use]
    pub fn confirmation_default() -> Self {
        Self {
            score: 15,
            level: RiskLevel::Low,
            reasons: vec!["Scored during confirmation".to_string()],
        }
    }

    /// Assessment used when scoring a pre-verification pay attempt fails.
    #[must_use]
    pub fn pay_attempt_default() -> Self {
        Self {
            score: 0,
            level: RiskLevel::Low,
            reasons: vec!["Normal behavior".to_string()],
        }
    }
}

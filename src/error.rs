//! Error types for trustpay-node.

use crate::chain::Rejection;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in trustpay-node.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing request input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The referenced invoice (or other entity) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Missing or invalid credentials.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The chain verifier rejected the transaction.
    #[error("not verified on chain: {}", .0.reason.message())]
    Verification(Box<Rejection>),

    /// Chain node, risk endpoint or auth service unreachable or malformed.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Database error.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Unexpected internal failure (e.g. a confirmation task panicked).
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::Forbidden(_) => "forbidden",
            Self::Unauthorized(_) => "unauthorized",
            Self::Verification(_) => "not_verified",
            Self::Upstream(_) => "upstream_error",
            Self::Storage(_) => "storage_error",
            Self::Config(_) | Self::Io(_) | Self::Serialization(_) | Self::Internal(_) => {
                "internal_error"
            }
        }
    }

    /// Whether resubmitting the same request may succeed later.
    ///
    /// Upstream failures are transient; a verification rejection is tied to
    /// the transaction hash and never is.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Upstream(_))
    }
}

impl From<Rejection> for Error {
    fn from(rejection: Rejection) -> Self {
        Self::Verification(Box::new(rejection))
    }
}

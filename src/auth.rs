//! Caller authentication.
//!
//! User registration, login and token issuance live elsewhere. This module
//! only turns a bearer token into a [`Principal`] through an [`Authenticator`]:
//! a fixed token table for single-operator deployments and tests, or a remote
//! auth service.

use crate::config::{AuthConfig, TokenEntry};
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Role of an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Pays invoices; may only delete its own.
    #[default]
    Customer,
    /// Issues invoices.
    Merchant,
    /// Operator.
    Admin,
    /// Any role this service does not know about.
    #[serde(other)]
    Other,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Customer => "customer",
            Self::Merchant => "merchant",
            Self::Admin => "admin",
            Self::Other => "other",
        })
    }
}

/// An authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// User id; invoices are owned by this id.
    pub id: i64,
    /// Role.
    #[serde(default)]
    pub role: Role,
}

impl Principal {
    /// Whether the caller may act on a resource owned by `owner_id`.
    ///
    /// Customers are limited to their own resources; other roles are not.
    #[must_use]
    pub fn may_act_for(&self, owner_id: i64) -> bool {
        self.role != Role::Customer || self.id == owner_id
    }
}

/// Verifies a bearer token.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolve a token to a principal.
    ///
    /// # Errors
    ///
    /// Returns `Error::Unauthorized` for an unknown or rejected token and
    /// `Error::Upstream` when a remote service cannot be reached.
    async fn authenticate(&self, token: &str) -> Result<Principal>;
}

/// Extract the token from an `Authorization` header value.
#[must_use]
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticAuthenticator {
    /// Create an authenticator from configured tokens.
    #[must_use]
    pub fn new(entries: &[TokenEntry]) -> Self {
        let tokens = entries
            .iter()
            .map(|entry| {
                (
                    entry.token.clone(),
                    Principal {
                        id: entry.user_id,
                        role: entry.role,
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    /// Add a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }
}

#[async_trait]
impl Authenticator for StaticAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        self.tokens
            .get(token)
            .copied()
            .ok_or_else(|| Error::Unauthorized("Invalid token".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct MeResponse {
    user: Principal,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Remote auth service answering `GET {base}/auth/me` with `{user: {id, role}}`.
#[derive(Debug)]
pub struct RemoteAuthenticator {
    http_client: reqwest::Client,
    me_url: String,
}

impl RemoteAuthenticator {
    /// Create an authenticator for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build auth client: {e}")))?;
        Ok(Self {
            http_client,
            me_url: format!("{}/auth/me", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl Authenticator for RemoteAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal> {
        let response = self
            .http_client
            .get(&self.me_url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| {
                let e = e.without_url();
                warn!("Auth service unreachable: {}", e);
                Error::Upstream(format!("auth service error: {e}"))
            })?;

        if !response.status().is_success() {
            let message = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error)
                .unwrap_or_else(|| "Invalid token".to_string());
            debug!("Auth service rejected token: {}", message);
            return Err(Error::Unauthorized(message));
        }

        let body: MeResponse = response
            .json()
            .await
            .map_err(|e| {
                Error::Upstream(format!("malformed auth response: {}", e.without_url()))
            })?;
        Ok(body.user)
    }
}

/// Pick the authenticator the configuration asks for.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn authenticator_from_config(config: &AuthConfig) -> Result<Arc<dyn Authenticator>> {
    match config.url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            info!("Authenticating callers via {}", url);
            Ok(Arc::new(RemoteAuthenticator::new(url, Duration::from_secs(5))?))
        }
        None => {
            if config.tokens.is_empty() {
                warn!("No auth service or tokens configured; every request will be rejected");
            }
            Ok(Arc::new(StaticAuthenticator::new(&config.tokens)))
        }
    }
}

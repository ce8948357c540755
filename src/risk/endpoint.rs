//! Risk scoring endpoints.

use crate::error::{Error, Result};
use crate::types::Amount;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Inputs sent to a risk scoring endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RiskRequest {
    /// Invoice amount.
    pub amount: Amount,
    /// Invoice currency.
    pub currency: String,
    /// Customer the velocity counts were computed for.
    pub customer_id: i64,
    /// Payer wallet.
    pub payer_wallet: String,
    /// Payments created for this customer in the trailing 10 minutes.
    pub attempts_last_10min: u64,
    /// Payments created for this customer in the trailing 24 hours.
    pub payments_last_24h: u64,
    /// Whether the customer is new.
    pub is_new_customer: bool,
    /// Hour of day, `0..=23`.
    pub hour_of_day: u32,
}

/// Something that can score a [`RiskRequest`].
///
/// Responses are returned untyped; the caller defaults each field on its own.
#[async_trait]
pub trait RiskEndpoint: Send + Sync {
    /// Score a request.
    ///
    /// # Errors
    ///
    /// Returns `Error::Upstream` when the endpoint cannot be reached or
    /// answers with a failure status or a non-JSON body.
    async fn assess(&self, request: &RiskRequest) -> Result<Value>;
}

/// External scoring service reached over HTTP at `POST {base}/risk`.
#[derive(Debug)]
pub struct HttpRiskEndpoint {
    http_client: reqwest::Client,
    url: String,
}

impl HttpRiskEndpoint {
    /// Create an endpoint for the given base URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build risk client: {e}")))?;
        Ok(Self {
            http_client,
            url: format!("{}/risk", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl RiskEndpoint for HttpRiskEndpoint {
    async fn assess(&self, request: &RiskRequest) -> Result<Value> {
        debug!("POST {}", self.url);
        let response = self
            .http_client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                Error::Upstream(format!("risk endpoint unreachable: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Upstream(format!("risk endpoint returned HTTP {status}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::Upstream(format!("malformed risk response: {}", e.without_url())))
    }
}

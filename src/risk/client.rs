//! Risk scorer client.
//!
//! Computes the customer's payment velocity from the store, asks a
//! [`RiskEndpoint`] for an assessment and defaults whatever comes back field
//! by field. Scoring is advisory: it never returns an error.

use crate::error::Result;
use crate::risk::endpoint::{RiskEndpoint, RiskRequest};
use crate::store::InvoiceStore;
use crate::types::{Invoice, RiskAssessment, RiskLevel};
use chrono::{Timelike, Utc};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Short velocity window.
pub const ATTEMPT_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Long velocity window.
pub const FREQUENCY_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// Scores payments through a [`RiskEndpoint`].
#[derive(Clone)]
pub struct RiskScorer {
    store: InvoiceStore,
    endpoint: Arc<dyn RiskEndpoint>,
}

impl RiskScorer {
    /// Create a scorer.
    #[must_use]
    pub fn new(store: InvoiceStore, endpoint: Arc<dyn RiskEndpoint>) -> Self {
        Self { store, endpoint }
    }

    /// Score a confirmed payment, falling back to
    /// [`RiskAssessment::confirmation_default`].
    pub async fn score(&self, invoice: &Invoice, customer_id: i64, payer_wallet: &str) -> RiskAssessment {
        self.score_with_fallback(
            invoice,
            customer_id,
            payer_wallet,
            RiskAssessment::confirmation_default(),
        )
        .await
    }

    /// Score a payment, returning `fallback` on any failure and using its
    /// fields for anything missing from the endpoint's answer.
    pub async fn score_with_fallback(
        &self,
        invoice: &Invoice,
        customer_id: i64,
        payer_wallet: &str,
        fallback: RiskAssessment,
    ) -> RiskAssessment {
        match self.try_score(invoice, customer_id, payer_wallet).await {
            Ok(response) => {
                let assessment = assessment_from_response(&response, fallback);
                debug!(
                    "Risk for {}: {} {}",
                    invoice.reference, assessment.score, assessment.level
                );
                assessment
            }
            Err(e) => {
                warn!("Risk scoring for {} failed, using default: {}", invoice.reference, e);
                fallback
            }
        }
    }

    async fn try_score(&self, invoice: &Invoice, customer_id: i64, payer_wallet: &str) -> Result<Value> {
        let request = RiskRequest {
            amount: invoice.amount.clone(),
            currency: invoice.currency.clone(),
            customer_id,
            payer_wallet: payer_wallet.to_string(),
            attempts_last_10min: self
                .store
                .count_customer_payments_since(customer_id, ATTEMPT_WINDOW)?,
            payments_last_24h: self
                .store
                .count_customer_payments_since(customer_id, FREQUENCY_WINDOW)?,
            is_new_customer: false,
            hour_of_day: Utc::now().hour(),
        };
        self.endpoint.assess(&request).await
    }
}

/// Build an assessment from an untyped endpoint response.
///
/// A missing or non-integer score, a level outside `LOW`/`MEDIUM`/`HIGH`, and
/// a non-array `reasons` each fall back to the matching field of `fallback`
/// independently.
#[must_use]
pub fn assessment_from_response(response: &Value, fallback: RiskAssessment) -> RiskAssessment {
    let score = response
        .get("risk_score")
        .and_then(Value::as_i64)
        .unwrap_or(fallback.score);

    let level = response
        .get("risk_level")
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<RiskLevel>().ok())
        .unwrap_or(fallback.level);

    let reasons = response
        .get("reasons")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect()
        })
        .unwrap_or(fallback.reasons);

    RiskAssessment {
        score,
        level,
        reasons,
    }
}

//! Built-in rule-based risk model.
//!
//! Used when no external scoring service is configured. Every rule adds to the
//! score and contributes one reason, in rule order.

use crate::error::Result;
use crate::risk::endpoint::{RiskEndpoint, RiskRequest};
use crate::types::{RiskAssessment, RiskLevel};
use async_trait::async_trait;
use serde_json::Value;

const HIGH_AMOUNT: u64 = 20_000;
const MEDIUM_AMOUNT: u64 = 5_000;
const MANY_ATTEMPTS: u64 = 3;
const HIGH_FREQUENCY: u64 = 5;

/// Score a request with the fixed rule set.
#[must_use]
pub fn evaluate(request: &RiskRequest) -> RiskAssessment {
    let mut score: i64 = 0;
    let mut reasons = Vec::new();
    let mut add = |points: i64, reason: &str| {
        score += points;
        reasons.push(reason.to_string());
    };

    if request.amount.is_at_least(HIGH_AMOUNT) {
        add(35, "High amount payment");
    } else if request.amount.is_at_least(MEDIUM_AMOUNT) {
        add(15, "Medium amount payment");
    }

    if request.attempts_last_10min >= MANY_ATTEMPTS {
        add(25, "Many attempts in last 10 minutes");
    }

    if request.payments_last_24h >= HIGH_FREQUENCY {
        add(20, "High payment frequency (24h)");
    }

    if request.is_new_customer {
        add(10, "New customer");
    }

    // Late night.
    if request.hour_of_day <= 5 || request.hour_of_day >= 23 {
        add(10, "Unusual transaction hour");
    }

    let score = score.clamp(0, 100);
    let level = match score {
        70.. => RiskLevel::High,
        40..=69 => RiskLevel::Medium,
        _ => RiskLevel::Low,
    };

    if reasons.is_empty() {
        reasons.push("Normal behavior".to_string());
    }

    RiskAssessment {
        score,
        level,
        reasons,
    }
}

/// [`RiskEndpoint`] backed by [`evaluate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedEndpoint;

#[async_trait]
impl RiskEndpoint for RuleBasedEndpoint {
    async fn assess(&self, request: &RiskRequest) -> Result<Value> {
        Ok(serde_json::to_value(evaluate(request))?)
    }
}

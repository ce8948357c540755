//! Advisory risk scoring.
//!
//! [`RiskScorer`] gathers velocity counts and asks a [`RiskEndpoint`] for an
//! assessment: either an external service ([`HttpRiskEndpoint`]) or the
//! built-in rules ([`RuleBasedEndpoint`]). Failures are absorbed into a
//! conservative default and never reach the caller.

pub mod client;
pub mod endpoint;
pub mod rules;

pub use client::{assessment_from_response, RiskScorer, ATTEMPT_WINDOW, FREQUENCY_WINDOW};
pub use endpoint::{HttpRiskEndpoint, RiskEndpoint, RiskRequest};
pub use rules::RuleBasedEndpoint;

use crate::config::RiskConfig;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Pick the endpoint the configuration asks for.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn endpoint_from_config(config: &RiskConfig) -> Result<Arc<dyn RiskEndpoint>> {
    match config.url.as_deref().filter(|url| !url.trim().is_empty()) {
        Some(url) => {
            tracing::info!("Risk scoring via {}", url);
            Ok(Arc::new(HttpRiskEndpoint::new(
                url,
                Duration::from_secs(config.timeout_secs),
            )?))
        }
        None => {
            tracing::info!("Risk scoring via built-in rules");
            Ok(Arc::new(RuleBasedEndpoint))
        }
    }
}

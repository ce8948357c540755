//! Payment confirmation.
//!
//! Verifies a recorded transaction against its invoice, marks the invoice
//! VERIFIED, scores risk once per invoice and records the chain details on
//! the invoice's latest payment row.

use crate::auth::Principal;
use crate::chain::{ChainDetails, ChainVerifier, VerificationOutcome};
use crate::error::{Error, Result};
use crate::event::{NodeEvent, NodeEventsSender};
use crate::payment::locks::ReferenceLocks;
use crate::risk::RiskScorer;
use crate::store::{InvoiceStore, PaymentUpsert};
use crate::types::{InvoiceStatus, InvoiceView, Payment, TxHash, UNKNOWN_PAYER};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of a successful confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Confirmation {
    /// The invoice with its latest payment's risk fields.
    pub invoice: InvoiceView,
    /// Verified chain details, for audit display.
    pub chain: ChainDetails,
}

/// Whether an invoice still needs a risk assessment.
///
/// True when there is no payment yet, or the latest one was never scored.
#[must_use]
pub fn needs_risk_scoring(latest: Option<&Payment>) -> bool {
    latest.map_or(true, Payment::is_unscored)
}

/// Wallet to score: the verified sender, else the payer recorded on the
/// latest payment, else the unknown-payer sentinel.
#[must_use]
pub fn risk_payer(chain: &ChainDetails, latest: Option<&Payment>) -> String {
    chain_payer(chain)
        .or_else(|| {
            latest
                .map(|p| p.payer_wallet.clone())
                .filter(|wallet| !wallet.is_empty())
        })
        .unwrap_or_else(|| UNKNOWN_PAYER.to_string())
}

fn chain_payer(chain: &ChainDetails) -> Option<String> {
    Some(chain.from)
        .filter(|from| !from.is_zero())
        .map(|from| from.to_string())
}

/// Confirms invoice payments against the chain.
#[derive(Clone)]
pub struct ConfirmationService {
    store: InvoiceStore,
    verifier: Arc<ChainVerifier>,
    scorer: RiskScorer,
    locks: ReferenceLocks,
    events: NodeEventsSender,
}

impl ConfirmationService {
    /// Create a confirmation service.
    #[must_use]
    pub fn new(
        store: InvoiceStore,
        verifier: Arc<ChainVerifier>,
        scorer: RiskScorer,
        locks: ReferenceLocks,
        events: NodeEventsSender,
    ) -> Self {
        Self {
            store,
            verifier,
            scorer,
            locks,
            events,
        }
    }

    /// Confirm that `tx_hash` pays the invoice identified by `reference`.
    ///
    /// Confirmations of the same reference are serialized. Re-confirming an
    /// already verified invoice re-runs verification and succeeds again
    /// without adding a payment row or re-scoring risk.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for an empty reference or malformed hash
    /// - `Error::NotFound` for an unknown reference
    /// - `Error::Verification` when the chain verifier rejects the
    ///   transaction; nothing is written
    /// - `Error::Upstream` when the chain node cannot be reached
    /// - `Error::Storage` on database failure
    pub async fn confirm(
        &self,
        principal: &Principal,
        reference: &str,
        tx_hash: &str,
    ) -> Result<Confirmation> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(Error::Validation("reference required".to_string()));
        }
        let tx_hash = TxHash::parse(tx_hash)?;

        let _guard = self.locks.acquire(reference).await;

        let invoice = self
            .store
            .invoice_by_reference(reference)?
            .ok_or_else(|| Error::NotFound("Invoice not found".to_string()))?;

        let chain = match self
            .verifier
            .verify(&tx_hash, &invoice.reference, &invoice.amount)
            .await?
        {
            VerificationOutcome::Verified(details) => details,
            VerificationOutcome::Rejected(rejection) => {
                info!(
                    "Confirmation of {} with {} rejected: {}",
                    reference, tx_hash, rejection.reason
                );
                let _ = self.events.send(NodeEvent::VerificationRejected {
                    reference: reference.to_string(),
                    tx_hash: tx_hash.to_string(),
                    reason: rejection.reason,
                });
                return Err(rejection.into());
            }
        };

        if invoice.status == InvoiceStatus::Verified {
            debug!("{} already verified, re-applying", reference);
        }

        let latest = self.store.latest_payment(invoice.id)?;
        let risk = if needs_risk_scoring(latest.as_ref()) {
            let payer = risk_payer(&chain, latest.as_ref());
            let assessment = self.scorer.score(&invoice, principal.id, &payer).await;
            let _ = self.events.send(NodeEvent::RiskScored {
                reference: reference.to_string(),
                score: assessment.score,
                level: assessment.level,
            });
            Some(assessment)
        } else {
            None
        };

        self.store.record_verified_payment(
            invoice.id,
            &PaymentUpsert {
                tx_hash: tx_hash.to_string(),
                chain_payer: chain_payer(&chain),
                chain_timestamp: chain.timestamp.map(|ts| ts.to_string()),
                risk,
            },
        )?;

        let view = self.store.invoice_view(invoice.id)?.ok_or_else(|| {
            warn!("Invoice {} disappeared during confirmation", invoice.id);
            Error::Internal(format!("invoice {} disappeared during confirmation", invoice.id))
        })?;

        info!("Invoice {} verified by {}", reference, tx_hash);
        let _ = self.events.send(NodeEvent::InvoiceVerified {
            reference: reference.to_string(),
            tx_hash: tx_hash.to_string(),
        });

        Ok(Confirmation {
            invoice: view,
            chain,
        })
    }
}

//! Invoice operations around the confirmation pipeline: creation, listing,
//! guarded deletion and the pre-verification pay attempt.

use crate::auth::Principal;
use crate::error::{Error, Result};
use crate::event::{NodeEvent, NodeEventsSender};
use crate::payment::locks::ReferenceLocks;
use crate::risk::RiskScorer;
use crate::store::{is_unique_violation, InvoiceDraft, InvoiceStore, NewPayment};
use crate::types::{Amount, Invoice, InvoiceStatus, InvoiceView, Payment, RiskAssessment, TxHash};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Number of invoices returned by [`InvoiceService::list`].
pub const LIST_LIMIT: usize = 50;

/// Currency used when a new invoice names none.
pub const DEFAULT_CURRENCY: &str = "KES";

const REFERENCE_ATTEMPTS: usize = 3;

/// Request to create an invoice.
#[derive(Debug, Clone, Deserialize)]
pub struct NewInvoice {
    /// Amount due.
    pub amount: Option<Amount>,
    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// A pre-verification payment attempt.
#[derive(Debug, Clone, Deserialize)]
pub struct PayAttempt {
    /// Invoice reference.
    #[serde(default)]
    pub reference: String,
    /// Wallet the payer intends to pay from.
    #[serde(default)]
    pub payer_wallet: String,
    /// Transaction hash, if already submitted.
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Result of a pay attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PayAttemptReceipt {
    /// The invoice, now PROCESSING.
    pub invoice: Invoice,
    /// The recorded payment row.
    pub payment: Payment,
    /// The assessment stored on it.
    pub risk: RiskAssessment,
}

/// Generate a fresh invoice reference: `TP-<unix millis>-<6 upper hex>`.
#[must_use]
pub fn generate_reference() -> String {
    let suffix = rand::random::<u32>() & 0x00FF_FFFF;
    format!("TP-{}-{suffix:06X}", chrono::Utc::now().timestamp_millis())
}

/// Invoice lifecycle operations.
#[derive(Clone)]
pub struct InvoiceService {
    store: InvoiceStore,
    scorer: RiskScorer,
    locks: ReferenceLocks,
    events: NodeEventsSender,
}

impl InvoiceService {
    /// Create an invoice service.
    #[must_use]
    pub fn new(
        store: InvoiceStore,
        scorer: RiskScorer,
        locks: ReferenceLocks,
        events: NodeEventsSender,
    ) -> Self {
        Self {
            store,
            scorer,
            locks,
            events,
        }
    }

    /// Create a PENDING invoice owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` for a missing amount or blank currency and
    /// `Error::Storage` on database failure.
    pub fn create(&self, principal: &Principal, request: NewInvoice) -> Result<Invoice> {
        let amount = request
            .amount
            .ok_or_else(|| Error::Validation("amount required".to_string()))?;
        let currency = match request.currency.as_deref().map(str::trim) {
            None => DEFAULT_CURRENCY.to_string(),
            Some("") => return Err(Error::Validation("currency must not be blank".to_string())),
            Some(code) => code.to_ascii_uppercase(),
        };

        let mut draft = InvoiceDraft {
            reference: generate_reference(),
            customer_id: principal.id,
            description: request.description.unwrap_or_default(),
            amount,
            currency,
        };

        let mut attempt = 1;
        let invoice = loop {
            match self.store.insert_invoice(&draft) {
                Ok(invoice) => break invoice,
                Err(e) if is_unique_violation(&e) && attempt < REFERENCE_ATTEMPTS => {
                    debug!("Reference {} taken, regenerating", draft.reference);
                    draft.reference = generate_reference();
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        info!(
            "Invoice {} created for customer {} ({} {})",
            invoice.reference, invoice.customer_id, invoice.amount, invoice.currency
        );
        let _ = self.events.send(NodeEvent::InvoiceCreated {
            reference: invoice.reference.clone(),
        });
        Ok(invoice)
    }

    /// The latest invoices, newest first, with their latest risk fields.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` on database failure.
    pub fn list(&self) -> Result<Vec<InvoiceView>> {
        self.store.list_invoice_views(LIST_LIMIT)
    }

    /// Delete an invoice and its payments.
    ///
    /// Only PENDING and FAILED invoices can be deleted, whoever asks;
    /// customers may only delete their own.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for a non-positive id
    /// - `Error::NotFound` for an unknown id
    /// - `Error::Forbidden` for someone else's invoice or a protected status
    pub async fn delete(&self, principal: &Principal, id: i64) -> Result<i64> {
        if id <= 0 {
            return Err(Error::Validation("Invalid invoice id".to_string()));
        }
        let invoice = self
            .store
            .invoice_by_id(id)?
            .ok_or_else(|| Error::NotFound("Invoice not found".to_string()))?;

        // Serialize with confirmations so the status check still holds at delete.
        let _guard = self.locks.acquire(&invoice.reference).await;
        let invoice = self
            .store
            .invoice_by_id(id)?
            .ok_or_else(|| Error::NotFound("Invoice not found".to_string()))?;

        if !principal.may_act_for(invoice.customer_id) {
            return Err(Error::Forbidden(
                "Not authorized to delete this invoice".to_string(),
            ));
        }
        if !invoice.status.is_deletable() {
            return Err(Error::Forbidden(format!(
                "Cannot delete invoice with status {}",
                invoice.status
            )));
        }

        if !self.store.delete_invoice(id)? {
            return Err(Error::NotFound("Invoice not found".to_string()));
        }
        info!("Invoice {} ({}) deleted", id, invoice.reference);
        let _ = self.events.send(NodeEvent::InvoiceDeleted { id });
        Ok(id)
    }

    /// Record a payment attempt before on-chain confirmation.
    ///
    /// Scores risk, appends a payment row and moves the invoice to
    /// PROCESSING. VERIFIED and FAILED invoices are terminal and never move.
    ///
    /// # Errors
    ///
    /// - `Error::Validation` for a missing reference or wallet, a malformed
    ///   hash, or a VERIFIED or FAILED invoice
    /// - `Error::NotFound` for an unknown reference
    pub async fn pay_attempt(
        &self,
        principal: &Principal,
        request: PayAttempt,
    ) -> Result<PayAttemptReceipt> {
        let reference = request.reference.trim();
        let payer_wallet = request.payer_wallet.trim();
        if reference.is_empty() || payer_wallet.is_empty() {
            return Err(Error::Validation(
                "reference and payer_wallet required".to_string(),
            ));
        }
        let tx_hash = request
            .tx_hash
            .as_deref()
            .filter(|hash| !hash.trim().is_empty())
            .map(TxHash::parse)
            .transpose()?;

        let _guard = self.locks.acquire(reference).await;

        let invoice = self
            .store
            .invoice_by_reference(reference)?
            .ok_or_else(|| Error::NotFound("Invoice not found".to_string()))?;
        match invoice.status {
            InvoiceStatus::Verified => {
                return Err(Error::Validation("Invoice already verified".to_string()));
            }
            InvoiceStatus::Failed => {
                return Err(Error::Validation("Invoice has failed".to_string()));
            }
            InvoiceStatus::Pending | InvoiceStatus::Processing => {}
        }

        let risk = self
            .scorer
            .score_with_fallback(
                &invoice,
                principal.id,
                payer_wallet,
                RiskAssessment::pay_attempt_default(),
            )
            .await;

        let payment = self.store.insert_payment(&NewPayment {
            invoice_id: invoice.id,
            payer_wallet: payer_wallet.to_string(),
            tx_hash: tx_hash.map(|hash| hash.to_string()),
            risk: Some(risk.clone()),
        })?;
        self.store
            .update_status(invoice.id, InvoiceStatus::Processing)?;

        let invoice = Invoice {
            status: InvoiceStatus::Processing,
            ..invoice
        };
        info!(
            "Payment attempt {} recorded for {} (risk {} {})",
            payment.id, invoice.reference, risk.score, risk.level
        );
        let _ = self.events.send(NodeEvent::PaymentAttempted {
            reference: invoice.reference.clone(),
        });

        Ok(PayAttemptReceipt {
            invoice,
            payment,
            risk,
        })
    }
}

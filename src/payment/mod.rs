//! Payment confirmation and invoice lifecycle.
//!
//! The confirmation strategy:
//! 1. Verify the recorded transaction against the invoice on chain
//! 2. Score risk once per invoice
//! 3. Mark the invoice VERIFIED and record the chain details in one transaction
//!
//! # Architecture
//!
//! ```text
//! confirm(reference, tx_hash)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Per-reference lock  │
//! └─────────┬───────────┘
//!           │
//!           ▼
//!   Lookup invoice ──missing──► NotFound
//!           │
//!           ▼
//!   Chain verifier ──rejected──► Verification (no writes)
//!           │
//!        VERIFIED
//!           │
//!    ┌──────┴──────┐
//!    │             │
//!  scored      unscored / no row
//!    │             │
//!    ▼             ▼
//!  keep risk   Risk scorer
//!    │             │
//!    └──────┬──────┘
//!           ▼
//!   Mark VERIFIED + upsert latest payment (one transaction)
//!           │
//!           ▼
//!   Invoice + latest risk + chain details
//! ```

mod confirmation;
mod invoices;
mod locks;

pub use confirmation::{needs_risk_scoring, risk_payer, Confirmation, ConfirmationService};
pub use invoices::{
    generate_reference, InvoiceService, NewInvoice, PayAttempt, PayAttemptReceipt,
    DEFAULT_CURRENCY, LIST_LIMIT,
};
pub use locks::{LockStats, ReferenceGuard, ReferenceLocks};

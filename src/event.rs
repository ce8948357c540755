//! Node event system.

use crate::chain::FailureReason;
use crate::types::RiskLevel;
use tokio::sync::broadcast;

/// Events emitted by the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// Node has started successfully.
    Started,

    /// Node is shutting down.
    ShuttingDown,

    /// Invoice created.
    InvoiceCreated {
        /// Invoice reference.
        reference: String,
    },

    /// Pre-verification payment attempt recorded.
    PaymentAttempted {
        /// Invoice reference.
        reference: String,
    },

    /// Invoice confirmed on chain.
    InvoiceVerified {
        /// Invoice reference.
        reference: String,
        /// Verified transaction.
        tx_hash: String,
    },

    /// Confirmation rejected by the chain verifier.
    VerificationRejected {
        /// Invoice reference.
        reference: String,
        /// Checked transaction.
        tx_hash: String,
        /// Which check failed.
        reason: FailureReason,
    },

    /// Risk scored for an invoice.
    RiskScored {
        /// Invoice reference.
        reference: String,
        /// Score.
        score: i64,
        /// Level.
        level: RiskLevel,
    },

    /// Invoice deleted.
    InvoiceDeleted {
        /// Invoice id.
        id: i64,
    },

    /// Error occurred.
    Error {
        /// Error message.
        message: String,
    },
}

/// Channel for receiving node events.
pub type NodeEventsChannel = broadcast::Receiver<NodeEvent>;

/// Sender for node events.
pub type NodeEventsSender = broadcast::Sender<NodeEvent>;

/// Create a new event channel pair.
#[must_use]
pub fn create_event_channel() -> (NodeEventsSender, NodeEventsChannel) {
    broadcast::channel(256)
}

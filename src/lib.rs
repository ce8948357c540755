//! # trustpay-node
//!
//! Invoice payment confirmation with on-chain proof verification.
//!
//! A merchant issues an invoice, the payer records a
//! `recordPayment(reference, amount, auxHash)` call on the payment-proof
//! contract, and this node verifies that transaction before the invoice is
//! marked `VERIFIED`. Risk scoring runs afterwards as an advisory step and can
//! never fail a confirmation.
//!
//! ## Components
//!
//! - [`store`]: SQLite persistence for invoices and payment attempts
//! - [`chain`]: JSON-RPC reader and the strictly ordered [`chain::ChainVerifier`]
//! - [`risk`]: velocity aggregates plus an external (or rule-based) scorer
//! - [`payment`]: the confirmation orchestrator and invoice operations
//! - [`api`]: the HTTP boundary
//! - [`node`]: wiring from [`NodeConfig`] to a running server

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod auth;
pub mod chain;
pub mod config;
pub mod error;
pub mod event;
pub mod node;
pub mod payment;
pub mod risk;
pub mod store;
pub mod types;

pub use config::NodeConfig;
pub use error::{Error, Result};
pub use event::{NodeEvent, NodeEventsChannel};
pub use node::{NodeBuilder, RunningNode};

//! End-to-end tests against a running node.
//!
//! Each test starts a real node on an ephemeral port with an on-disk
//! database, a scripted chain and a counting risk endpoint, then talks to it
//! over HTTP.

mod harness;

mod confirmation_tests;
mod invoice_tests;

use harness::{tx_hash, TestHarness};

//! Test harness that runs a node against scripted collaborators.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use alloy_primitives::{address, Address, U256};
use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde_json::Value;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;
use trustpay_node::auth::Role;
use trustpay_node::chain::abi::encode_record_payment;
use trustpay_node::chain::{ChainReader, ChainTransaction, TxReceipt};
use trustpay_node::config::TokenEntry;
use trustpay_node::risk::{RiskEndpoint, RiskRequest};
use trustpay_node::types::TxHash;
use trustpay_node::{NodeBuilder, NodeConfig};

/// Payment-proof contract the node is configured with.
pub const CONTRACT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");
/// Sender of scripted payments.
pub const PAYER: Address = address!("70997970C51812dc3A010C7d01b50e0d17dc79C8");
/// Block timestamp of scripted payments.
pub const BLOCK_TIMESTAMP: u64 = 1_700_000_000;

/// Customer id 7.
pub const CUSTOMER: &str = "token-customer-7";
/// Customer id 8.
pub const OTHER_CUSTOMER: &str = "token-customer-8";
/// Merchant id 1.
pub const MERCHANT: &str = "token-merchant-1";
/// Admin id 2.
pub const ADMIN: &str = "token-admin-2";

/// Chain whose receipts and transactions are scripted per hash.
#[derive(Default)]
pub struct ScriptedChain {
    receipts: Mutex<HashMap<String, TxReceipt>>,
    transactions: Mutex<HashMap<String, ChainTransaction>>,
    unreachable: Mutex<bool>,
}

impl ScriptedChain {
    /// Mine an arbitrary transaction.
    pub fn mine(&self, tx_hash: &str, status: u64, to: Option<Address>, input: Vec<u8>) {
        self.receipts.lock().insert(
            tx_hash.to_string(),
            TxReceipt {
                status: Some(status),
                block_number: Some(42),
            },
        );
        self.transactions.lock().insert(
            tx_hash.to_string(),
            ChainTransaction {
                from: PAYER,
                to,
                input,
                block_number: Some(42),
            },
        );
    }

    /// Mine a successful `recordPayment` call to the contract.
    pub fn mine_payment(&self, tx_hash: &str, reference: &str, amount: u64) {
        self.mine(
            tx_hash,
            1,
            Some(CONTRACT),
            encode_record_payment(reference, U256::from(amount), "0xTEMP"),
        );
    }

    /// Keep the receipt but lose the transaction body.
    pub fn forget_body(&self, tx_hash: &str) {
        self.transactions.lock().remove(tx_hash);
    }

    /// Make every receipt lookup fail at the transport level.
    pub fn set_unreachable(&self, unreachable: bool) {
        *self.unreachable.lock() = unreachable;
    }
}

#[async_trait]
impl ChainReader for ScriptedChain {
    async fn transaction_receipt(
        &self,
        tx_hash: &TxHash,
    ) -> trustpay_node::Result<Option<TxReceipt>> {
        if *self.unreachable.lock() {
            return Err(trustpay_node::Error::Upstream(
                "connection refused".to_string(),
            ));
        }
        Ok(self.receipts.lock().get(tx_hash.as_str()).cloned())
    }

    async fn transaction(
        &self,
        tx_hash: &TxHash,
    ) -> trustpay_node::Result<Option<ChainTransaction>> {
        Ok(self.transactions.lock().get(tx_hash.as_str()).cloned())
    }

    async fn block_timestamp(&self, _block_number: u64) -> trustpay_node::Result<Option<u64>> {
        Ok(Some(BLOCK_TIMESTAMP))
    }
}

/// Risk endpoint answering a fixed score and counting calls.
pub struct CountingRisk {
    calls: AtomicUsize,
    response: Value,
}

impl CountingRisk {
    fn new(response: Value) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            response,
        }
    }
}

#[async_trait]
impl RiskEndpoint for CountingRisk {
    async fn assess(&self, _request: &RiskRequest) -> trustpay_node::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// A node running in the background plus handles on its collaborators.
pub struct TestHarness {
    addr: SocketAddr,
    client: reqwest::Client,
    chain: Arc<ScriptedChain>,
    risk: Arc<CountingRisk>,
    db_path: PathBuf,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<trustpay_node::Result<()>>,
    _dir: TempDir,
}

impl TestHarness {
    /// Start a node whose risk endpoint scores every payment 42/MEDIUM.
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let db_path = dir.path().join("trustpay.db");

        let mut config = NodeConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_path: db_path.clone(),
            ..NodeConfig::default()
        };
        config.chain.contract_address = CONTRACT.to_string();
        config.auth.tokens = vec![
            token(CUSTOMER, 7, Role::Customer),
            token(OTHER_CUSTOMER, 8, Role::Customer),
            token(MERCHANT, 1, Role::Merchant),
            token(ADMIN, 2, Role::Admin),
        ];

        let chain = Arc::new(ScriptedChain::default());
        let risk = Arc::new(CountingRisk::new(serde_json::json!({
            "risk_score": 42,
            "risk_level": "MEDIUM",
            "reasons": ["Scripted"],
        })));

        let mut node = NodeBuilder::new(config)
            .with_chain_reader(chain.clone())
            .with_risk_endpoint(risk.clone())
            .build()
            .await
            .expect("node should build");
        let addr = node.local_addr();
        let shutdown = node.shutdown_handle();
        let server = tokio::spawn(async move { node.run().await });
        info!("Test node listening on {}", addr);

        Self {
            addr,
            client: reqwest::Client::new(),
            chain,
            risk,
            db_path,
            shutdown,
            server,
            _dir: dir,
        }
    }

    /// The scripted chain.
    pub fn chain(&self) -> &ScriptedChain {
        &self.chain
    }

    /// How many times the risk endpoint was called.
    pub fn risk_calls(&self) -> usize {
        self.risk.calls.load(Ordering::SeqCst)
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> (StatusCode, Value) {
        let response = request.send().await.expect("request should be sent");
        let status = response.status();
        let body = response.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// `GET path`.
    pub async fn get(&self, token: Option<&str>, path: &str) -> (StatusCode, Value) {
        let mut request = self.client.get(self.url(path));
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        self.send(request).await
    }

    /// `POST path` with a JSON body.
    pub async fn post(&self, token: &str, path: &str, body: Value) -> (StatusCode, Value) {
        self.send(self.client.post(self.url(path)).bearer_auth(token).json(&body))
            .await
    }

    /// `DELETE path`.
    pub async fn delete(&self, token: &str, path: &str) -> (StatusCode, Value) {
        self.send(self.client.delete(self.url(path)).bearer_auth(token))
            .await
    }

    /// Create an invoice as `token` and return its JSON.
    pub async fn create_invoice(&self, token: &str, amount: u64) -> Value {
        let (status, body) = self
            .post(
                token,
                "/payments/invoices",
                serde_json::json!({ "amount": amount, "description": "e2e" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body["invoice"].clone()
    }

    /// Confirm `reference` with `tx_hash` as the default customer.
    pub async fn confirm(&self, reference: &str, tx_hash: &str) -> (StatusCode, Value) {
        self.post(
            CUSTOMER,
            "/payments/confirm",
            serde_json::json!({ "reference": reference, "tx_hash": tx_hash }),
        )
        .await
    }

    /// Number of payment rows stored for an invoice.
    pub fn payment_rows(&self, invoice_id: i64) -> i64 {
        let conn = rusqlite::Connection::open(&self.db_path).expect("open database");
        conn.query_row(
            "SELECT COUNT(*) FROM payments WHERE invoice_id = ?1",
            [invoice_id],
            |row| row.get(0),
        )
        .expect("count payments")
    }

    /// Stop the node and wait for it to exit.
    pub async fn teardown(self) {
        self.shutdown.send(true).expect("node should be listening");
        tokio::time::timeout(Duration::from_secs(5), self.server)
            .await
            .expect("node should stop in time")
            .expect("node task should not panic")
            .expect("node should stop cleanly");
    }
}

fn token(token: &str, user_id: i64, role: Role) -> TokenEntry {
    TokenEntry {
        token: token.to_string(),
        user_id,
        role,
    }
}

/// A well-formed transaction hash distinct per `n`.
pub fn tx_hash(n: u64) -> String {
    format!("0x{n:064x}")
}

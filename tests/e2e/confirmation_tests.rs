//! Confirmation flow over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{CONTRACT, CUSTOMER, PAYER};
use super::{tx_hash, TestHarness};
use alloy_primitives::address;
use futures::future::join_all;
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn listed(harness: &TestHarness, id: &Value) -> Value {
    let (status, body) = harness.get(Some(CUSTOMER), "/payments/invoices").await;
    assert_eq!(status, StatusCode::OK);
    body["invoices"]
        .as_array()
        .unwrap()
        .iter()
        .find(|invoice| &invoice["id"] == id)
        .cloned()
        .expect("invoice should be listed")
}

fn reference(invoice: &Value) -> String {
    invoice["reference"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_confirm_verifies_and_scores() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);
    let tx = tx_hash(1);
    harness.chain().mine_payment(&tx, &reference, 2500);

    let (status, body) = harness.confirm(&reference, &tx).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["status"], "VERIFIED");
    assert_eq!(body["invoice"]["risk_score"], 42);
    assert_eq!(body["invoice"]["risk_level"], "MEDIUM");
    assert_eq!(body["chain"]["verified"], true);
    assert_eq!(body["chain"]["txHash"], tx.as_str());
    assert_eq!(body["chain"]["reference"], reference.as_str());
    assert_eq!(body["chain"]["amount"], "2500");
    assert_eq!(body["chain"]["blockNumber"], 42);
    assert_eq!(body["chain"]["timestamp"], 1_700_000_000);
    assert_eq!(
        body["chain"]["from"].as_str().unwrap().to_lowercase(),
        PAYER.to_string().to_lowercase()
    );
    assert_eq!(
        body["chain"]["to"].as_str().unwrap().to_lowercase(),
        CONTRACT.to_string().to_lowercase()
    );

    assert_eq!(listed(&harness, &invoice["id"]).await["status"], "VERIFIED");
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 1);
    assert_eq!(harness.risk_calls(), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_amount_mismatch_leaves_invoice_untouched() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);
    let tx = tx_hash(2);
    harness.chain().mine_payment(&tx, &reference, 2400);

    let (status, body) = harness.confirm(&reference, &tx).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "not_verified");
    assert_eq!(body["retryable"], false);
    assert_eq!(body["details"]["verified"], false);
    assert_eq!(body["details"]["code"], "amount_mismatch");
    assert_eq!(body["details"]["reason"], "amount mismatch vs tx input");
    assert_eq!(body["details"]["amount"], "2500");
    assert_eq!(body["details"]["onTx"], "2400");

    assert_eq!(listed(&harness, &invoice["id"]).await["status"], "PENDING");
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 0);
    assert_eq!(harness.risk_calls(), 0);

    harness.teardown().await;
}

#[tokio::test]
async fn test_every_rejection_reason() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);
    let chain = harness.chain();

    let mut payment_call = trustpay_node::chain::abi::encode_record_payment(
        &reference,
        alloy_primitives::U256::from(2500u64),
        "0xTEMP",
    );

    chain.mine(&tx_hash(11), 0, Some(CONTRACT), payment_call.clone());
    chain.mine_payment(&tx_hash(12), &reference, 2500);
    chain.forget_body(&tx_hash(12));
    chain.mine(
        &tx_hash(13),
        1,
        Some(address!("000000000000000000000000000000000000dead")),
        payment_call.clone(),
    );
    chain.mine(&tx_hash(14), 1, Some(CONTRACT), vec![0xde, 0xad]);
    payment_call[..4].copy_from_slice(&[0xa9, 0x05, 0x9c, 0xbb]);
    chain.mine(&tx_hash(15), 1, Some(CONTRACT), payment_call);
    chain.mine_payment(&tx_hash(16), "TP-0-000000", 2500);

    let cases = [
        (tx_hash(10), "not_found"),
        (tx_hash(11), "reverted"),
        (tx_hash(12), "details_unavailable"),
        (tx_hash(13), "wrong_target"),
        (tx_hash(14), "decode_failed"),
        (tx_hash(15), "function_mismatch"),
        (tx_hash(16), "reference_mismatch"),
    ];
    for (tx, code) in cases {
        let (status, body) = harness.confirm(&reference, &tx).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{code}: {body}");
        assert_eq!(body["details"]["code"], code);
        assert_eq!(body["details"]["txHash"], tx.as_str());
    }

    assert_eq!(listed(&harness, &invoice["id"]).await["status"], "PENDING");
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 0);
    assert_eq!(harness.risk_calls(), 0);

    harness.teardown().await;
}

#[tokio::test]
async fn test_confirm_is_idempotent() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);
    let tx = tx_hash(3);
    harness.chain().mine_payment(&tx, &reference, 2500);

    let (first_status, first) = harness.confirm(&reference, &tx).await;
    let (second_status, second) = harness.confirm(&reference, &tx).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(first["invoice"]["status"], second["invoice"]["status"]);
    assert_eq!(first["invoice"]["risk_score"], second["invoice"]["risk_score"]);
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 1);
    assert_eq!(harness.risk_calls(), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_concurrent_confirms_score_once() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);
    let tx = tx_hash(4);
    harness.chain().mine_payment(&tx, &reference, 2500);

    let results = join_all((0..5).map(|_| harness.confirm(&reference, &tx))).await;
    for (status, body) in results {
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["invoice"]["risk_score"], 42);
    }
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 1);
    assert_eq!(harness.risk_calls(), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_scored_pay_attempt_is_not_rescored() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);
    let tx = tx_hash(5);

    let (status, body) = harness
        .post(
            CUSTOMER,
            "/payments/pay",
            json!({ "reference": reference, "payer_wallet": "0xabc" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["invoice"]["status"], "PROCESSING");
    assert_eq!(harness.risk_calls(), 1);

    harness.chain().mine_payment(&tx, &reference, 2500);
    let (status, body) = harness.confirm(&reference, &tx).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["invoice"]["status"], "VERIFIED");
    assert_eq!(body["invoice"]["risk_score"], 42);
    assert_eq!(harness.risk_calls(), 1);
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_unreachable_chain_is_upstream_error() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);
    harness.chain().set_unreachable(true);

    let (status, body) = harness.confirm(&reference, &tx_hash(6)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "upstream_error");
    assert_eq!(body["retryable"], true);
    assert_eq!(listed(&harness, &invoice["id"]).await["status"], "PENDING");

    harness.teardown().await;
}

#[tokio::test]
async fn test_request_errors() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    let reference = reference(&invoice);

    let (status, body) = harness.confirm("TP-0-FFFFFF", &tx_hash(7)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = harness.confirm(&reference, "0xTEMP").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = harness.confirm("", &tx_hash(7)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = harness
        .post("not-a-token", "/payments/confirm", json!({ "reference": reference }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    harness.teardown().await;
}

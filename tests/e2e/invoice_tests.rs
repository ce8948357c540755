//! Invoice lifecycle over HTTP.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{ADMIN, CUSTOMER, MERCHANT, OTHER_CUSTOMER};
use super::{tx_hash, TestHarness};
use reqwest::StatusCode;
use serde_json::{json, Value};

async fn verified_invoice(harness: &TestHarness, n: u64) -> Value {
    let invoice = harness.create_invoice(CUSTOMER, 1000).await;
    let reference = invoice["reference"].as_str().unwrap();
    let tx = tx_hash(n);
    harness.chain().mine_payment(&tx, reference, 1000);
    let (status, _) = harness.confirm(reference, &tx).await;
    assert_eq!(status, StatusCode::OK);
    invoice
}

#[tokio::test]
async fn test_health_is_public() {
    let harness = TestHarness::start().await;
    let (status, body) = harness.get(None, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "OK");
    assert_eq!(body["service"], "trustpay-node");

    let (status, _) = harness.get(None, "/payments/invoices").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    harness.teardown().await;
}

#[tokio::test]
async fn test_create_defaults_and_validation() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 2500).await;
    assert_eq!(invoice["status"], "PENDING");
    assert_eq!(invoice["currency"], "KES");
    assert_eq!(invoice["customer_id"], 7);
    assert!(invoice["reference"].as_str().unwrap().starts_with("TP-"));

    let (status, body) = harness
        .post(CUSTOMER, "/payments/invoices", json!({ "description": "no amount" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    harness.teardown().await;
}

#[tokio::test]
async fn test_delete_pending_invoice() {
    let harness = TestHarness::start().await;
    let mine = harness.create_invoice(CUSTOMER, 100).await;
    let other = harness.create_invoice(OTHER_CUSTOMER, 100).await;

    let (status, _) = harness
        .delete(CUSTOMER, &format!("/payments/invoices/{}", other["id"]))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = harness
        .delete(CUSTOMER, &format!("/payments/invoices/{}", mine["id"]))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["deleted_id"], mine["id"]);

    let (status, _) = harness
        .delete(MERCHANT, &format!("/payments/invoices/{}", other["id"]))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = harness
        .delete(CUSTOMER, &format!("/payments/invoices/{}", mine["id"]))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    harness.teardown().await;
}

#[tokio::test]
async fn test_verified_invoice_cannot_be_deleted_by_anyone() {
    let harness = TestHarness::start().await;
    let invoice = verified_invoice(&harness, 20).await;
    let path = format!("/payments/invoices/{}", invoice["id"]);

    for token in [CUSTOMER, MERCHANT, ADMIN] {
        let (status, body) = harness.delete(token, &path).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{token}");
        assert_eq!(body["message"], "Cannot delete invoice with status VERIFIED");
    }
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 1);

    harness.teardown().await;
}

#[tokio::test]
async fn test_processing_invoice_cannot_be_deleted() {
    let harness = TestHarness::start().await;
    let invoice = harness.create_invoice(CUSTOMER, 100).await;
    let (status, _) = harness
        .post(
            CUSTOMER,
            "/payments/pay",
            json!({ "reference": invoice["reference"], "payer_wallet": "0xabc" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let path = format!("/payments/invoices/{}", invoice["id"]);
    for token in [CUSTOMER, ADMIN] {
        let (status, body) = harness.delete(token, &path).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Cannot delete invoice with status PROCESSING");
    }

    harness.teardown().await;
}

#[tokio::test]
async fn test_bad_invoice_ids() {
    let harness = TestHarness::start().await;
    for path in ["/payments/invoices/abc", "/payments/invoices/0"] {
        let (status, body) = harness.delete(CUSTOMER, path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{path}");
        assert_eq!(body["error"], "validation_error");
    }
    harness.teardown().await;
}

#[tokio::test]
async fn test_pay_attempt_on_verified_invoice_is_rejected() {
    let harness = TestHarness::start().await;
    let invoice = verified_invoice(&harness, 21).await;

    let (status, body) = harness
        .post(
            CUSTOMER,
            "/payments/pay",
            json!({ "reference": invoice["reference"], "payer_wallet": "0xabc" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(harness.payment_rows(invoice["id"].as_i64().unwrap()), 1);

    harness.teardown().await;
}

//! HTTP boundary.
//!
//! ```text
//! GET    /health
//! POST   /payments/confirm        {reference, tx_hash}
//! POST   /payments/invoices       {amount, currency?, description?}
//! GET    /payments/invoices
//! DELETE /payments/invoices/:id
//! POST   /payments/pay            {reference, payer_wallet, tx_hash?}
//! ```
//!
//! Every `/payments` route requires `Authorization: Bearer <token>`.

mod error;
mod handlers;

pub use error::ApiError;
pub use handlers::ConfirmRequest;

use crate::auth::{bearer_token, Authenticator, Principal};
use crate::error::Error;
use crate::payment::{ConfirmationService, InvoiceService};
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Service name reported by `/health`.
pub const SERVICE_NAME: &str = "trustpay-node";

/// Shared state of every handler.
#[derive(Clone)]
pub struct AppState {
    /// Confirmation orchestrator.
    pub confirmations: ConfirmationService,
    /// Invoice operations.
    pub invoices: InvoiceService,
    /// Bearer token verification.
    pub authenticator: Arc<dyn Authenticator>,
}

/// Extracts the authenticated caller from the `Authorization` header.
#[derive(Debug, Clone, Copy)]
pub struct Authenticated(pub Principal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Authenticated
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(bearer_token)
            .ok_or_else(|| Error::Unauthorized("Missing token".to_string()))?;

        let state = AppState::from_ref(state);
        let principal = state.authenticator.authenticate(token).await?;
        Ok(Self(principal))
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let payments = Router::new()
        .route("/confirm", post(handlers::confirm))
        .route(
            "/invoices",
            post(handlers::create_invoice).get(handlers::list_invoices),
        )
        .route("/invoices/:id", delete(handlers::delete_invoice))
        .route("/pay", post(handlers::pay));

    Router::new()
        .route("/health", get(handlers::health))
        .nest("/payments", payments)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::auth::{Role, StaticAuthenticator};
    use crate::chain::verifier::tests::{hash, MockChain, CONTRACT};
    use crate::chain::{ChainVerifier, RECORD_PAYMENT_SIGNATURE};
    use crate::event::create_event_channel;
    use crate::payment::ReferenceLocks;
    use crate::risk::{RiskScorer, RuleBasedEndpoint};
    use crate::store::{InvoiceDraft, InvoiceStore};
    use crate::types::{Amount, InvoiceStatus};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    const TOKEN: &str = "customer-7";

    fn app() -> (Router, InvoiceStore, Arc<MockChain>) {
        let store = InvoiceStore::open_in_memory().unwrap();
        let chain = Arc::new(MockChain::default());
        let verifier =
            Arc::new(ChainVerifier::new(chain.clone(), CONTRACT, RECORD_PAYMENT_SIGNATURE).unwrap());
        let scorer = RiskScorer::new(store.clone(), Arc::new(RuleBasedEndpoint));
        let locks = ReferenceLocks::new();
        let (events, _) = create_event_channel();
        let state = AppState {
            confirmations: ConfirmationService::new(
                store.clone(),
                verifier,
                scorer.clone(),
                locks.clone(),
                events.clone(),
            ),
            invoices: InvoiceService::new(store.clone(), scorer, locks, events),
            authenticator: Arc::new(StaticAuthenticator::default().with_token(
                TOKEN,
                Principal {
                    id: 7,
                    role: Role::Customer,
                },
            )),
        };
        (router(state), store, chain)
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder()
            .method(method)
            .uri(uri)
            .header(AUTHORIZATION, format!("Bearer {TOKEN}"));
        let body = match body {
            Some(value) => {
                request = request.header("content-type", "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let (app, _, _) = app();
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_and_invalid_tokens() {
        let (app, _, _) = app();
        let response = app
            .clone()
            .oneshot(Request::get("/payments/invoices").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::get("/payments/invoices")
                    .header(AUTHORIZATION, "Bearer wrong")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_confirm_round_trip() {
        let (app, store, chain) = app();
        let invoice = store
            .insert_invoice(&InvoiceDraft {
                reference: "TP-1700000000-ABC1".to_string(),
                customer_id: 7,
                description: String::new(),
                amount: Amount::parse("2500").unwrap(),
                currency: "KES".to_string(),
            })
            .unwrap();
        let tx = hash(1);
        chain.mine_payment(&tx, "TP-1700000000-ABC1", 2500);

        let (status, body) = send(
            app,
            "POST",
            "/payments/confirm",
            Some(json!({ "reference": "TP-1700000000-ABC1", "tx_hash": tx.as_str() })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["invoice"]["status"], "VERIFIED");
        assert_eq!(body["invoice"]["id"], invoice.id);
        assert_eq!(body["chain"]["verified"], true);
        assert_eq!(body["chain"]["blockNumber"], 42);
        assert_eq!(
            store.invoice_by_id(invoice.id).unwrap().unwrap().status,
            InvoiceStatus::Verified
        );
    }

    #[tokio::test]
    async fn test_malformed_json_is_validation_error() {
        let (app, _, _) = app();
        let response = app
            .oneshot(
                Request::post("/payments/confirm")
                    .header(AUTHORIZATION, format!("Bearer {TOKEN}"))
                    .header("content-type", "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_non_numeric_invoice_id_is_bad_request() {
        let (app, _, _) = app();
        let (status, body) = send(app, "DELETE", "/payments/invoices/abc", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_create_then_list() {
        let (app, _, _) = app();
        let (status, body) = send(
            app.clone(),
            "POST",
            "/payments/invoices",
            Some(json!({ "amount": 2500, "description": "Consulting" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["invoice"]["amount"], "2500");
        assert_eq!(body["invoice"]["currency"], "KES");

        let (status, body) = send(app, "GET", "/payments/invoices", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["invoices"].as_array().unwrap().len(), 1);
        assert!(body["invoices"][0]["risk_score"].is_null());
    }
}

//! Route handlers.

use crate::api::error::ApiError;
use crate::api::{AppState, Authenticated, SERVICE_NAME};
use crate::error::Error;
use crate::payment::{Confirmation, NewInvoice, PayAttempt, PayAttemptReceipt};
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

type ApiResult<T> = Result<T, ApiError>;

/// Body of `POST /payments/confirm`.
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// Invoice reference.
    #[serde(default)]
    pub reference: String,
    /// Transaction hash.
    #[serde(default)]
    pub tx_hash: String,
}

pub(crate) async fn health() -> Json<Value> {
    Json(json!({ "status": "OK", "service": SERVICE_NAME }))
}

pub(crate) async fn confirm(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> ApiResult<Json<Confirmation>> {
    let Json(request) = payload?;
    let service = state.confirmations.clone();

    // Runs to completion even if the client goes away.
    let task = tokio::spawn(async move {
        service
            .confirm(&principal, &request.reference, &request.tx_hash)
            .await
    });
    let confirmation = task
        .await
        .map_err(|e| Error::Internal(format!("confirmation task failed: {e}")))??;
    Ok(Json(confirmation))
}

pub(crate) async fn create_invoice(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: Result<Json<NewInvoice>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(request) = payload?;
    let invoice = state.invoices.create(&principal, request)?;
    Ok((StatusCode::CREATED, Json(json!({ "invoice": invoice }))))
}

pub(crate) async fn list_invoices(
    State(state): State<AppState>,
    Authenticated(_): Authenticated,
) -> ApiResult<Json<Value>> {
    let invoices = state.invoices.list()?;
    Ok(Json(json!({ "invoices": invoices })))
}

pub(crate) async fn delete_invoice(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Value>> {
    let Path(id) = id.map_err(|_| Error::Validation("Invalid invoice id".to_string()))?;
    let deleted_id = state.invoices.delete(&principal, id).await?;
    Ok(Json(json!({ "success": true, "deleted_id": deleted_id })))
}

pub(crate) async fn pay(
    State(state): State<AppState>,
    Authenticated(principal): Authenticated,
    payload: Result<Json<PayAttempt>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<PayAttemptReceipt>)> {
    let Json(request) = payload?;
    let receipt = state.invoices.pay_attempt(&principal, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

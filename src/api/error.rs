//! Mapping from [`Error`] to HTTP responses.

use crate::error::Error;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use tracing::{error, warn};

/// An [`Error`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    /// HTTP status for the wrapped error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) | Error::Verification(_) => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Upstream(_)
            | Error::Storage(_)
            | Error::Config(_)
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON body: a stable `error` code, a human `message`, whether the same
    /// request may succeed later (`retryable`) and optional `details`.
    /// Storage and internal failures carry no details.
    #[must_use]
    pub fn body(&self) -> Value {
        let code = self.0.code();
        let mut body = match &self.0 {
            Error::Validation(m)
            | Error::Unauthorized(m)
            | Error::Forbidden(m)
            | Error::NotFound(m) => json!({ "error": code, "message": m }),
            Error::Verification(rejection) => json!({
                "error": code,
                "message": "Not verified on chain",
                "details": rejection.to_json(),
            }),
            Error::Upstream(m) => json!({
                "error": code,
                "message": "Upstream service error",
                "details": m,
            }),
            Error::Storage(_) => json!({ "error": code, "message": "Database error" }),
            Error::Config(_) | Error::Io(_) | Error::Serialization(_) | Error::Internal(_) => {
                json!({ "error": code, "message": "Internal error" })
            }
        };
        if let Some(fields) = body.as_object_mut() {
            fields.insert("retryable".to_string(), Value::Bool(self.0.is_retryable()));
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (status, Json(self.body())).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self(Error::Validation(rejection.body_text()))
    }
}

//! Error types for the proxy service.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use tollgate::gateway::SettleError;
use tollgate::ledger::LedgerError;
use tollgate::proto::{PaymentRequired, VerificationError};

use crate::forward::ForwardError;

/// Errors that can occur while serving a proxied request.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// No resource is published under the requested service id.
    #[error("unknown resource: {0}")]
    UnknownResource(String),

    /// Payment is required; carries the full challenge for the 402 body.
    #[error("payment required: {}", .0.error)]
    PaymentRequired(Box<PaymentRequired>),

    /// The payment proof failed verification.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// A ledger operation failed unexpectedly.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Settlement against the gateway failed.
    #[error("settlement failed: {0}")]
    Settle(#[from] SettleError),

    /// The resource origin could not be reached after settlement.
    #[error(transparent)]
    Forward(#[from] ForwardError),

    /// Missing or invalid admin credentials.
    #[error("unauthorized")]
    Unauthorized,
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        match self {
            Self::PaymentRequired(challenge) => {
                (StatusCode::PAYMENT_REQUIRED, Json(*challenge)).into_response()
            }
            Self::Verification(err) => {
                let body = serde_json::json!({
                    "error": err.to_string(),
                    "reason": err.reason_code(),
                });
                (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response()
            }
            Self::UnknownResource(id) => {
                let body = serde_json::json!({ "error": format!("unknown resource: {id}") });
                (StatusCode::NOT_FOUND, Json(body)).into_response()
            }
            Self::Unauthorized => {
                let body = serde_json::json!({ "error": "unauthorized" });
                (StatusCode::UNAUTHORIZED, Json(body)).into_response()
            }
            Self::Settle(err) => {
                let body = serde_json::json!({ "error": err.to_string() });
                (StatusCode::BAD_GATEWAY, Json(body)).into_response()
            }
            Self::Forward(err) => {
                let body = serde_json::json!({ "error": err.to_string() });
                (StatusCode::BAD_GATEWAY, Json(body)).into_response()
            }
            Self::Ledger(err) => {
                let body = serde_json::json!({ "error": err.to_string() });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

//! Caller-facing payment endpoints: initiate, status poll, and attempt
//! inspection.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::{error, warn};
use uuid::Uuid;

use crate::database::payment_attempts::PaymentAttemptStore;
use crate::payments::error::PaymentError;
use crate::payments::types::RawAmount;
use crate::services::initiator::{InitiateCommand, PaymentInitiator};
use crate::services::status::StatusPoller;

#[derive(Clone)]
pub struct PaymentsState {
    pub initiator: Arc<PaymentInitiator>,
    pub poller: Arc<StatusPoller>,
    pub attempts: Arc<dyn PaymentAttemptStore>,
}

#[derive(Debug, Deserialize)]
pub struct InitiateBody {
    #[serde(alias = "phone", alias = "msisdn", alias = "mpesa_number")]
    pub phone_number: Option<String>,
    pub amount: Option<RawAmount>,
    pub external_reference: Option<String>,
    pub callback_url: Option<String>,
    pub metadata: Option<JsonValue>,
}

/// POST /api/payments/mpesa/initiate
pub async fn initiate_payment(
    State(state): State<PaymentsState>,
    Json(body): Json<InitiateBody>,
) -> Response {
    let command = InitiateCommand {
        phone: body.phone_number,
        amount: body.amount,
        external_reference: body.external_reference,
        callback_url: body.callback_url,
        metadata: body.metadata,
    };

    match state.initiator.initiate(command).await {
        Ok(payment) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "status": "success",
                "data": payment.data,
            })),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub reference: Option<String>,
}

/// GET /api/payments/mpesa/status?reference=…
pub async fn query_status(
    State(state): State<PaymentsState>,
    Query(query): Query<StatusQuery>,
) -> Response {
    let Some(reference) = query
        .reference
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({
                "success": false,
                "status": "error",
                "message": "reference query parameter is required",
            })),
        )
            .into_response();
    };

    match state.poller.query(reference).await {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(err) => error_response(&err),
    }
}

/// GET /api/payments/mpesa/attempts/{id}
pub async fn get_attempt(
    State(state): State<PaymentsState>,
    Path(id): Path<Uuid>,
) -> Response {
    match state.attempts.find_by_id(id).await {
        Ok(Some(attempt)) => (StatusCode::OK, Json(attempt)).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "status": "error",
                "message": "payment attempt not found",
            })),
        )
            .into_response(),
        Err(err) => error_response(&PaymentError::from(err)),
    }
}

/// Failure envelope shared by the initiate and status endpoints. Provider
/// detail rides along so the storefront can show actionable messages.
pub(crate) fn error_response(err: &PaymentError) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!(error = %err, "payment request failed");
    } else {
        warn!(error = %err, "payment request rejected");
    }

    let (mpesa_error, original_status) = match err {
        PaymentError::ProviderRejected {
            detail,
            http_status,
            ..
        } => (detail.clone().unwrap_or(JsonValue::Null), *http_status),
        _ => (JsonValue::Null, status.as_u16()),
    };

    (
        status,
        Json(json!({
            "success": false,
            "status": "error",
            "message": err.user_message(),
            "error": {
                "code": "MPESA_ERROR",
                "mpesaError": mpesa_error,
                "originalStatus": original_status,
            },
        })),
    )
        .into_response()
}

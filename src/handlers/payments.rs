use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::errors::AppError;
use crate::services::payments::gateway::{self, CaptureResult};
use crate::state::AppState;

const ORDER_APPROVED_EVENTS: &[&str] = &["CHECKOUT.ORDER.APPROVED", "order.approved"];

// POST /api/bookings/:id/orders
#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub amount: i64,
    pub currency: String,
}

#[derive(Serialize)]
pub struct CreateOrderResponse {
    order_id: String,
}

pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<CreateOrderResponse>), AppError> {
    let order_id = gateway::create_order(&state, &id, payload.amount, &payload.currency).await?;
    Ok((StatusCode::CREATED, Json(CreateOrderResponse { order_id })))
}

// POST /api/payments/capture
#[derive(Deserialize)]
pub struct CaptureRequest {
    pub order_id: String,
}

pub async fn capture_payment(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CaptureRequest>,
) -> Result<Json<CaptureResult>, AppError> {
    let result = gateway::capture(&state, &payload.order_id).await?;
    Ok(Json(result))
}

// POST /webhook/payments
#[derive(Deserialize)]
pub struct WebhookPayload {
    pub event_type: String,
    pub resource: WebhookResource,
}

#[derive(Deserialize)]
pub struct WebhookResource {
    pub id: String,
}

fn validate_signature(secret: &str, signature: &str, body: &[u8]) -> bool {
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&decoded).is_ok()
}

/// Errors that describe the booking rather than the attempt: redelivering
/// the same callback would get the same answer.
fn is_settled(err: &AppError) -> bool {
    matches!(
        err,
        AppError::NotFound(_)
            | AppError::InvalidTransition { .. }
            | AppError::Superseded(_)
            | AppError::Validation(_)
            | AppError::MissingReason(_)
            | AppError::AmountMismatch { .. }
            | AppError::BelowMinimum { .. }
            | AppError::FreeService
            | AppError::Forbidden
    )
}

pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    // Validate signature (skip if secret is empty, dev mode)
    if !state.config.payment_webhook_secret.is_empty() {
        let signature = headers
            .get("x-payment-signature")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if signature.is_empty() {
            tracing::warn!("missing X-Payment-Signature header");
            return (StatusCode::FORBIDDEN, "Missing signature").into_response();
        }

        if !validate_signature(&state.config.payment_webhook_secret, signature, &body) {
            tracing::warn!("invalid payment webhook signature");
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            tracing::warn!(error = %e, "malformed payment webhook");
            return (StatusCode::BAD_REQUEST, "Malformed payload").into_response();
        }
    };

    tracing::info!(event_type = %payload.event_type, order_id = %payload.resource.id, "payment webhook");

    if !ORDER_APPROVED_EVENTS.contains(&payload.event_type.as_str()) {
        return Json(serde_json::json!({"ok": true, "ignored": payload.event_type})).into_response();
    }

    match gateway::capture(&state, &payload.resource.id).await {
        Ok(result) => Json(result).into_response(),
        // Only a definitive answer about the booking stops redelivery.
        Err(e) if !is_settled(&e) => {
            tracing::warn!(order_id = %payload.resource.id, error = %e, "payment webhook failed, provider will redeliver");
            e.into_response()
        }
        Err(e) => {
            tracing::info!(order_id = %payload.resource.id, error = %e, "payment webhook settled without capture");
            Json(serde_json::json!({"ok": true, "ignored": e.to_string()})).into_response()
        }
    }
}

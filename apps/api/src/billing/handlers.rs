//! Axum route handlers for payment webhooks and checkout.
//!
//! Webhook handlers take the body as raw `Bytes`: the signature covers the exact bytes
//! the provider sent, so nothing is parsed until verification has passed.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::billing::reconciler::ReconcileOutcome;
use crate::billing::{lemonsqueezy, signature, stripe};
use crate::errors::AppError;
use crate::state::AppState;

const LEMONSQUEEZY_SIGNATURE_HEADER: &str = "x-signature";
const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/lemonsqueezy/webhook
pub async fn handle_lemonsqueezy_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let header = signature_header(&headers, LEMONSQUEEZY_SIGNATURE_HEADER)?;
    signature::verify_lemonsqueezy(&body, header, state.billing.webhook_secret())?;

    let event = lemonsqueezy::parse_webhook(&body)?;
    let outcome = state.reconciler.apply(&event).await?;

    Ok(Json(acknowledgement(&outcome)))
}

/// POST /api/stripe/webhook
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    let header = signature_header(&headers, STRIPE_SIGNATURE_HEADER)?;
    signature::verify_stripe(
        &body,
        header,
        state.billing.webhook_secret(),
        Utc::now().timestamp(),
    )?;

    let event = stripe::parse_webhook(&body)?;
    let outcome = state.reconciler.apply(&event).await?;

    Ok(Json(acknowledgement(&outcome)))
}

/// POST /api/checkout
///
/// Creates a hosted Lemon Squeezy checkout carrying the user id as custom data, so the
/// subscription_created webhook can be tied back to the user.
pub async fn handle_create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;
    if request.user_id.trim().is_empty() || request.email.trim().is_empty() {
        return Err(AppError::Validation(
            "user_id and email are required".to_string(),
        ));
    }

    let client = state
        .checkout
        .as_ref()
        .ok_or_else(|| AppError::NotFound("Checkout is not available".to_string()))?;

    let url = client
        .create_checkout(&request.user_id, &request.email)
        .await?;

    Ok(Json(CheckoutResponse { url }))
}

fn signature_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, AppError> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::InvalidSignature(format!("missing {name} header")))
}

/// Every non-error outcome is a 200 so the provider stops redelivering.
fn acknowledgement(outcome: &ReconcileOutcome) -> Value {
    match outcome {
        ReconcileOutcome::Ignored { event } => json!({
            "received": true,
            "message": "Unknown event type",
            "event": event,
        }),
        _ => json!({ "received": true }),
    }
}

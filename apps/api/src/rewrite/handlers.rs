//! Axum route handlers for the Rewrite API.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::AppError;
use crate::llm_client::tone::Tone;
use crate::models::email::{EmailRecord, NewEmailRecord};
use crate::quota::{self, QuotaStatus};
use crate::state::AppState;

const DEFAULT_EMAIL_LIMIT: i64 = 10;
const MAX_EMAIL_LIMIT: i64 = 100;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RewriteRequest {
    pub email: String,
    pub tone: String,
    #[serde(default)]
    pub roast: bool,
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct RewriteResponse {
    pub rewritten: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub roast: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EmailsQuery {
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EmailsResponse {
    pub emails: Vec<EmailRecord>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/rewrite
///
/// Quota check → rewrite → optional roast → persist. Usage is only counted once the
/// rewrite has been stored.
pub async fn handle_rewrite(
    State(state): State<AppState>,
    payload: Result<Json<RewriteRequest>, JsonRejection>,
) -> Result<Json<RewriteResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    if request.email.trim().is_empty() {
        return Err(AppError::Validation("email cannot be empty".to_string()));
    }
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("user_id cannot be empty".to_string()));
    }

    if !quota::can_user_make_request(state.store.as_ref(), &request.user_id).await? {
        info!("User {} hit the daily rewrite limit", request.user_id);
        return Err(AppError::QuotaExceeded);
    }

    let tone = Tone::parse(&request.tone);
    let rewritten = state.rewriter.rewrite(&request.email, tone).await?;

    let roast = if request.roast {
        match state.rewriter.roast(&request.email).await {
            Ok(roast) => Some(roast),
            Err(e) => {
                warn!("Roast failed for user {}, returning rewrite only: {e}", request.user_id);
                None
            }
        }
    } else {
        None
    };

    state
        .store
        .record_rewrite(NewEmailRecord {
            user_id: request.user_id,
            original: request.email,
            rewritten: rewritten.clone(),
            roast: roast.clone(),
            tone: tone.label().to_string(),
            roast_mode: request.roast,
        })
        .await?;

    Ok(Json(RewriteResponse { rewritten, roast }))
}

/// GET /api/usage/:user_id
pub async fn handle_get_usage(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<QuotaStatus>, AppError> {
    let status = quota::quota_status(state.store.as_ref(), &user_id).await?;
    Ok(Json(status))
}

/// GET /api/emails/:user_id?limit=N
///
/// Newest first. A missing or unparsable limit means 10.
pub async fn handle_get_emails(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(query): Query<EmailsQuery>,
) -> Result<Json<EmailsResponse>, AppError> {
    let limit = email_limit(query.limit.as_deref());
    let emails = state.store.recent_emails(&user_id, limit).await?;
    Ok(Json(EmailsResponse { emails }))
}

fn email_limit(raw: Option<&str>) -> i64 {
    raw.and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_EMAIL_LIMIT)
        .min(MAX_EMAIL_LIMIT)
}

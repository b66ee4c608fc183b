//! Daily rewrite quota. Pro users bypass it; everyone else gets `DAILY_FREE_LIMIT` per day.
//!
//! The check is read-only. Usage is bumped later by `record_rewrite`, so two concurrent
//! requests at the limit can both pass; the limit is a soft fairness control.

use serde::Serialize;

use crate::errors::AppError;
use crate::store::EntitlementStore;

pub const DAILY_FREE_LIMIT: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub usage: i64,
    pub is_pro: bool,
    pub limit: i64,
}

impl QuotaStatus {
    pub fn allows_request(&self) -> bool {
        self.is_pro || self.usage < self.limit
    }
}

/// Unknown users are `NotFound`; store failures propagate so callers fail closed.
pub async fn quota_status(
    store: &dyn EntitlementStore,
    user_id: &str,
) -> Result<QuotaStatus, AppError> {
    let user = store
        .find_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {user_id} not found")))?;

    let usage = store.daily_usage(user_id).await?;

    Ok(QuotaStatus {
        usage,
        is_pro: user.is_pro,
        limit: DAILY_FREE_LIMIT,
    })
}

pub async fn can_user_make_request(
    store: &dyn EntitlementStore,
    user_id: &str,
) -> Result<bool, AppError> {
    Ok(quota_status(store, user_id).await?.allows_request())
}

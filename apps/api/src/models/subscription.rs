use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One row per provider subscription, keyed on `external_subscription_id`.
/// Rows are updated in place and never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: String,
    pub provider: String,
    pub external_subscription_id: String,
    pub external_customer_id: String,
    pub status: String,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

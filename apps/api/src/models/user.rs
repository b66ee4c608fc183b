use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user row. `is_pro` is a cached entitlement, written only by webhook reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    pub is_pro: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A stored rewrite. Append-only: never updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EmailRecord {
    pub id: Uuid,
    pub user_id: String,
    pub original: String,
    pub rewritten: String,
    pub roast: Option<String>,
    pub tone: String,
    pub roast_mode: bool,
    pub created_at: DateTime<Utc>,
}

/// Insert form of [`EmailRecord`].
#[derive(Debug, Clone)]
pub struct NewEmailRecord {
    pub user_id: String,
    pub original: String,
    pub rewritten: String,
    pub roast: Option<String>,
    pub tone: String,
    pub roast_mode: bool,
}

//! Entitlement store: the only component that touches persisted state.
//!
//! `AppState` holds an `Arc<dyn EntitlementStore>`; production uses
//! [`postgres::PgEntitlementStore`], tests use the in-memory store.

use async_trait::async_trait;

use crate::billing::reconciler::{ReconcileOutcome, ReconciliationPlan};
use crate::errors::AppError;
use crate::models::email::{EmailRecord, NewEmailRecord};
use crate::models::user::User;

#[cfg(test)]
pub mod memory;
pub mod postgres;

#[async_trait]
pub trait EntitlementStore: Send + Sync {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError>;

    /// Number of rewrites the user has made today.
    async fn daily_usage(&self, user_id: &str) -> Result<i64, AppError>;

    /// Stores the rewrite and bumps today's usage in one unit of work.
    async fn record_rewrite(&self, record: NewEmailRecord) -> Result<EmailRecord, AppError>;

    /// Newest first.
    async fn recent_emails(&self, user_id: &str, limit: i64)
        -> Result<Vec<EmailRecord>, AppError>;

    /// Executes the subscription write and the entitlement change atomically.
    async fn apply_reconciliation(
        &self,
        plan: &ReconciliationPlan,
    ) -> Result<ReconcileOutcome, AppError>;
}

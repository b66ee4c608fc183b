//! In-memory store mirroring the PostgreSQL semantics, for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::billing::reconciler::{
    EntitlementChange, ReconcileOutcome, ReconciliationPlan, SubscriptionWrite,
};
use crate::errors::AppError;
use crate::models::email::{EmailRecord, NewEmailRecord};
use crate::models::subscription::SubscriptionRow;
use crate::models::user::User;
use crate::store::EntitlementStore;

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    subscriptions: HashMap<String, SubscriptionRow>,
    /// Insertion order is creation order.
    emails: Vec<EmailRecord>,
    usage: HashMap<String, i64>,
}

#[derive(Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    pub fn insert_user(&self, id: &str, email: &str, is_pro: bool) {
        let now = Utc::now();
        self.inner.lock().unwrap().users.insert(
            id.to_string(),
            User {
                id: id.to_string(),
                email: email.to_string(),
                is_pro,
                created_at: now,
                updated_at: now,
            },
        );
    }

    pub fn set_email(&self, user_id: &str, email: &str) {
        if let Some(user) = self.inner.lock().unwrap().users.get_mut(user_id) {
            user.email = email.to_string();
        }
    }

    pub fn remove_user(&self, user_id: &str) {
        self.inner.lock().unwrap().users.remove(user_id);
    }

    pub fn set_usage(&self, user_id: &str, usage: i64) {
        self.inner
            .lock()
            .unwrap()
            .usage
            .insert(user_id.to_string(), usage);
    }

    pub fn user(&self, id: &str) -> Option<User> {
        self.inner.lock().unwrap().users.get(id).cloned()
    }

    pub fn subscription(&self, external_id: &str) -> Option<SubscriptionRow> {
        self.inner
            .lock()
            .unwrap()
            .subscriptions
            .get(external_id)
            .cloned()
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.lock().unwrap().subscriptions.len()
    }

    pub fn email_count(&self, user_id: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .emails
            .iter()
            .filter(|e| e.user_id == user_id)
            .count()
    }
}

#[async_trait]
impl EntitlementStore for InMemoryStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(self.user(user_id))
    }

    async fn daily_usage(&self, user_id: &str) -> Result<i64, AppError> {
        Ok(*self.inner.lock().unwrap().usage.get(user_id).unwrap_or(&0))
    }

    async fn record_rewrite(&self, record: NewEmailRecord) -> Result<EmailRecord, AppError> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let stored = EmailRecord {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            original: record.original,
            rewritten: record.rewritten,
            roast: record.roast,
            tone: record.tone,
            roast_mode: record.roast_mode,
            created_at: Utc::now(),
        };
        inner.emails.push(stored.clone());
        *inner.usage.entry(stored.user_id.clone()).or_insert(0) += 1;
        Ok(stored)
    }

    async fn recent_emails(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<EmailRecord>, AppError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .emails
            .iter()
            .rev()
            .filter(|e| e.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn apply_reconciliation(
        &self,
        plan: &ReconciliationPlan,
    ) -> Result<ReconcileOutcome, AppError> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let facts = &plan.facts;
        let key = facts.external_subscription_id.clone();
        let now = Utc::now();

        // Resolve the owner and check it exists before writing anything, as the
        // Postgres transaction would roll back on a missing user.
        let owner = match (&plan.write, inner.subscriptions.get(&key)) {
            (_, Some(row)) => row.user_id.clone(),
            (SubscriptionWrite::UpdateExisting { .. }, None) => {
                return Ok(ReconcileOutcome::SubscriptionNotFound {
                    external_subscription_id: key,
                });
            }
            (SubscriptionWrite::Upsert { owner }, None) => {
                let by_email = owner.email.as_deref().and_then(|email| {
                    inner
                        .users
                        .values()
                        .find(|u| u.email.eq_ignore_ascii_case(email))
                        .map(|u| u.id.clone())
                });
                let resolved = by_email.or_else(|| {
                    owner
                        .user_id
                        .as_ref()
                        .filter(|id| inner.users.contains_key(id.as_str()))
                        .cloned()
                });
                let Some(user_id) = resolved else {
                    return Ok(ReconcileOutcome::OwnerNotFound {
                        external_subscription_id: key,
                    });
                };
                user_id
            }
        };

        let user = inner
            .users
            .get_mut(&owner)
            .ok_or_else(|| AppError::NotFound(format!("User {owner} not found")))?;

        match inner.subscriptions.get_mut(&key) {
            Some(row) => {
                let include_period = match &plan.write {
                    SubscriptionWrite::Upsert { .. } => {
                        row.external_customer_id = facts.external_customer_id.clone();
                        true
                    }
                    SubscriptionWrite::UpdateExisting { include_period } => *include_period,
                };
                row.status = facts.status.as_str().to_string();
                if include_period {
                    row.current_period_start =
                        facts.current_period_start.or(row.current_period_start);
                    row.current_period_end = facts.current_period_end.or(row.current_period_end);
                }
                row.updated_at = now;
            }
            None => {
                inner.subscriptions.insert(
                    key.clone(),
                    SubscriptionRow {
                        id: Uuid::new_v4(),
                        user_id: owner.clone(),
                        provider: plan.provider.as_str().to_string(),
                        external_subscription_id: key.clone(),
                        external_customer_id: facts.external_customer_id.clone(),
                        status: facts.status.as_str().to_string(),
                        current_period_start: facts.current_period_start,
                        current_period_end: facts.current_period_end,
                        created_at: now,
                        updated_at: now,
                    },
                );
            }
        }

        if let EntitlementChange::Set(is_pro) = plan.entitlement {
            user.is_pro = is_pro;
            user.updated_at = now;
        }

        Ok(ReconcileOutcome::Applied {
            user_id: owner,
            status: facts.status.as_str().to_string(),
            is_pro: user.is_pro,
        })
    }
}

/// A store whose every call fails, for exercising fail-closed paths.
pub struct UnavailableStore;

#[async_trait]
impl EntitlementStore for UnavailableStore {
    async fn find_user(&self, _user_id: &str) -> Result<Option<User>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn daily_usage(&self, _user_id: &str) -> Result<i64, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn record_rewrite(&self, _record: NewEmailRecord) -> Result<EmailRecord, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn recent_emails(
        &self,
        _user_id: &str,
        _limit: i64,
    ) -> Result<Vec<EmailRecord>, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }

    async fn apply_reconciliation(
        &self,
        _plan: &ReconciliationPlan,
    ) -> Result<ReconcileOutcome, AppError> {
        Err(AppError::Database(sqlx::Error::PoolTimedOut))
    }
}

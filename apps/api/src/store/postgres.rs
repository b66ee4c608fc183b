use async_trait::async_trait;
use sqlx::{PgConnection, PgPool};
use tracing::debug;

use crate::billing::events::OwnerHint;
use crate::billing::reconciler::{
    EntitlementChange, ReconcileOutcome, ReconciliationPlan, SubscriptionWrite,
};
use crate::errors::AppError;
use crate::models::email::{EmailRecord, NewEmailRecord};
use crate::models::subscription::SubscriptionRow;
use crate::models::user::User;
use crate::store::EntitlementStore;

/// PostgreSQL-backed store. Usage counting goes through the `increment_usage` and
/// `get_user_usage` SQL functions shipped with the migrations.
#[derive(Clone)]
pub struct PgEntitlementStore {
    pool: PgPool,
}

impl PgEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntitlementStore for PgEntitlementStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<User>, AppError> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, email, is_pro, created_at, updated_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn daily_usage(&self, user_id: &str) -> Result<i64, AppError> {
        let usage: i32 = sqlx::query_scalar("SELECT get_user_usage($1)")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(i64::from(usage))
    }

    async fn record_rewrite(&self, record: NewEmailRecord) -> Result<EmailRecord, AppError> {
        let mut tx = self.pool.begin().await?;

        let stored = sqlx::query_as::<_, EmailRecord>(
            r#"
            INSERT INTO emails (user_id, original, rewritten, roast, tone, roast_mode)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, user_id, original, rewritten, roast, tone, roast_mode, created_at
            "#,
        )
        .bind(&record.user_id)
        .bind(&record.original)
        .bind(&record.rewritten)
        .bind(&record.roast)
        .bind(&record.tone)
        .bind(record.roast_mode)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("SELECT increment_usage($1)")
            .bind(&record.user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(stored)
    }

    async fn recent_emails(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<EmailRecord>, AppError> {
        Ok(sqlx::query_as::<_, EmailRecord>(
            r#"
            SELECT id, user_id, original, rewritten, roast, tone, roast_mode, created_at
            FROM emails
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn apply_reconciliation(
        &self,
        plan: &ReconciliationPlan,
    ) -> Result<ReconcileOutcome, AppError> {
        let mut tx = self.pool.begin().await?;
        let subscription_id = &plan.facts.external_subscription_id;

        let row = match &plan.write {
            SubscriptionWrite::Upsert { owner } => {
                // An existing row keeps its owner; the hint only matters for a first insert.
                let existing_owner: Option<String> = sqlx::query_scalar(
                    "SELECT user_id FROM subscriptions WHERE external_subscription_id = $1 FOR UPDATE",
                )
                .bind(subscription_id)
                .fetch_optional(&mut *tx)
                .await?;

                let user_id = match existing_owner {
                    Some(user_id) => user_id,
                    None => match resolve_owner(&mut tx, owner).await? {
                        Some(user_id) => user_id,
                        None => {
                            tx.rollback().await?;
                            return Ok(ReconcileOutcome::OwnerNotFound {
                                external_subscription_id: subscription_id.clone(),
                            });
                        }
                    },
                };
                upsert_subscription(&mut tx, plan, &user_id).await?
            }
            SubscriptionWrite::UpdateExisting { include_period } => {
                match update_subscription(&mut tx, plan, *include_period).await? {
                    Some(row) => row,
                    None => {
                        tx.rollback().await?;
                        return Ok(ReconcileOutcome::SubscriptionNotFound {
                            external_subscription_id: subscription_id.clone(),
                        });
                    }
                }
            }
        };

        debug!(
            subscription_row = %row.id,
            status = %row.status,
            "Subscription row written"
        );
        let owner = row.user_id;

        let is_pro: Option<bool> = match plan.entitlement {
            EntitlementChange::Set(is_pro) => {
                sqlx::query_scalar(
                    "UPDATE users SET is_pro = $1, updated_at = NOW() WHERE id = $2 RETURNING is_pro",
                )
                .bind(is_pro)
                .bind(&owner)
                .fetch_optional(&mut *tx)
                .await?
            }
            EntitlementChange::Unchanged => {
                sqlx::query_scalar("SELECT is_pro FROM users WHERE id = $1")
                    .bind(&owner)
                    .fetch_optional(&mut *tx)
                    .await?
            }
        };
        let Some(is_pro) = is_pro else {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!("User {owner} not found")));
        };

        tx.commit().await?;

        Ok(ReconcileOutcome::Applied {
            user_id: owner,
            status: plan.facts.status.as_str().to_string(),
            is_pro,
        })
    }
}

/// Email first, then the id carried in checkout custom data.
async fn resolve_owner(
    conn: &mut PgConnection,
    owner: &OwnerHint,
) -> Result<Option<String>, sqlx::Error> {
    if let Some(email) = owner.email.as_deref() {
        let by_email: Option<String> =
            sqlx::query_scalar("SELECT id FROM users WHERE lower(email) = lower($1)")
                .bind(email)
                .fetch_optional(&mut *conn)
                .await?;
        if by_email.is_some() {
            return Ok(by_email);
        }
    }

    if let Some(user_id) = owner.user_id.as_deref() {
        debug!("Resolving subscription owner by user id hint");
        return sqlx::query_scalar("SELECT id FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await;
    }

    Ok(None)
}

/// For an existing row the stored owner is kept; `user_id` only applies to inserts.
async fn upsert_subscription(
    conn: &mut PgConnection,
    plan: &ReconciliationPlan,
    user_id: &str,
) -> Result<SubscriptionRow, sqlx::Error> {
    let facts = &plan.facts;
    sqlx::query_as::<_, SubscriptionRow>(
        r#"
        INSERT INTO subscriptions
            (user_id, provider, external_subscription_id, external_customer_id,
             status, current_period_start, current_period_end)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (external_subscription_id)
        DO UPDATE SET
            external_customer_id = EXCLUDED.external_customer_id,
            status = EXCLUDED.status,
            current_period_start = COALESCE(EXCLUDED.current_period_start, subscriptions.current_period_start),
            current_period_end = COALESCE(EXCLUDED.current_period_end, subscriptions.current_period_end),
            updated_at = NOW()
        RETURNING id, user_id, provider, external_subscription_id, external_customer_id,
                  status, current_period_start, current_period_end, created_at, updated_at
        "#,
    )
    .bind(user_id)
    .bind(plan.provider.as_str())
    .bind(&facts.external_subscription_id)
    .bind(&facts.external_customer_id)
    .bind(facts.status.as_str())
    .bind(facts.current_period_start)
    .bind(facts.current_period_end)
    .fetch_one(&mut *conn)
    .await
}

async fn update_subscription(
    conn: &mut PgConnection,
    plan: &ReconciliationPlan,
    include_period: bool,
) -> Result<Option<SubscriptionRow>, sqlx::Error> {
    let facts = &plan.facts;
    let (start, end) = if include_period {
        (facts.current_period_start, facts.current_period_end)
    } else {
        (None, None)
    };

    sqlx::query_as::<_, SubscriptionRow>(
        r#"
        UPDATE subscriptions
        SET status = $1,
            current_period_start = COALESCE($2, current_period_start),
            current_period_end = COALESCE($3, current_period_end),
            updated_at = NOW()
        WHERE external_subscription_id = $4
        RETURNING id, user_id, provider, external_subscription_id, external_customer_id,
                  status, current_period_start, current_period_end, created_at, updated_at
        "#,
    )
    .bind(facts.status.as_str())
    .bind(start)
    .bind(end)
    .bind(&facts.external_subscription_id)
    .fetch_optional(&mut *conn)
    .await
}

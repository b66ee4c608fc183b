//! Subscription reconciliation: applies verified lifecycle events to stored state.
//!
//! Every event becomes a [`ReconciliationPlan`]: one subscription write plus one
//! entitlement change, executed by the store as a single transaction.
//!
//! | Kind                         | Subscription write                 | Entitlement         |
//! |------------------------------|------------------------------------|---------------------|
//! | Created                      | upsert on external id              | status == active    |
//! | Updated / Resumed / Unpaused | update status + period             | status == active    |
//! | Cancelled / Expired          | update status                      | revoke              |
//! | Paused                       | update status                      | policy (keep)       |
//! | Unknown                      | none                               | none                |
//!
//! Each plan is idempotent. No ordering between events is enforced: whichever event is
//! processed last wins.

use std::sync::Arc;

use tracing::{info, warn};

use crate::billing::events::{
    OwnerHint, SubscriptionEvent, SubscriptionEventKind, SubscriptionFacts,
};
use crate::billing::PaymentProvider;
use crate::errors::AppError;
use crate::store::EntitlementStore;

/// Entitlement rules that are business decisions rather than provider facts.
#[derive(Debug, Clone, Copy)]
pub struct ReconcilerPolicy {
    /// A paused subscription keeps pro access until it is cancelled or expires.
    pub paused_keeps_pro: bool,
}

impl Default for ReconcilerPolicy {
    fn default() -> Self {
        Self {
            paused_keeps_pro: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionWrite {
    /// Insert keyed on the external id, or update status and period if the row exists.
    /// The owner is resolved from the hint only when inserting.
    Upsert { owner: OwnerHint },
    /// Update the existing row; the owner comes from the stored row.
    UpdateExisting { include_period: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntitlementChange {
    Set(bool),
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconciliationPlan {
    pub provider: PaymentProvider,
    pub write: SubscriptionWrite,
    pub facts: SubscriptionFacts,
    pub entitlement: EntitlementChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied {
        user_id: String,
        status: String,
        is_pro: bool,
    },
    /// Unrecognized event kind; acknowledged without touching state.
    Ignored { event: String },
    /// A non-create event for a subscription this service has never stored.
    SubscriptionNotFound { external_subscription_id: String },
    /// A create event whose customer matches no known user.
    OwnerNotFound { external_subscription_id: String },
}

/// Maps an event to its plan. `Ok(None)` means the event is acknowledged but not applied.
pub fn plan(
    event: &SubscriptionEvent,
    policy: ReconcilerPolicy,
) -> Result<Option<ReconciliationPlan>, AppError> {
    let (write, entitlement) = match &event.kind {
        SubscriptionEventKind::Unknown(_) => return Ok(None),
        SubscriptionEventKind::Created => (
            SubscriptionWrite::Upsert {
                owner: event.owner.clone(),
            },
            None,
        ),
        SubscriptionEventKind::Updated
        | SubscriptionEventKind::Resumed
        | SubscriptionEventKind::Unpaused => (
            SubscriptionWrite::UpdateExisting {
                include_period: true,
            },
            None,
        ),
        // Cancellation and expiry are unambiguous regardless of the status text.
        SubscriptionEventKind::Cancelled | SubscriptionEventKind::Expired => (
            SubscriptionWrite::UpdateExisting {
                include_period: false,
            },
            Some(EntitlementChange::Set(false)),
        ),
        SubscriptionEventKind::Paused => (
            SubscriptionWrite::UpdateExisting {
                include_period: false,
            },
            Some(if policy.paused_keeps_pro {
                EntitlementChange::Unchanged
            } else {
                EntitlementChange::Set(false)
            }),
        ),
    };

    let facts = event.facts.clone().ok_or_else(|| {
        AppError::InvalidPayload(format!(
            "{} event is missing its subscription object",
            event.kind.name()
        ))
    })?;

    let entitlement =
        entitlement.unwrap_or_else(|| EntitlementChange::Set(facts.status.grants_pro()));

    Ok(Some(ReconciliationPlan {
        provider: event.provider,
        write,
        facts,
        entitlement,
    }))
}

/// Applies webhook events to the entitlement store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<dyn EntitlementStore>,
    policy: ReconcilerPolicy,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntitlementStore>, policy: ReconcilerPolicy) -> Self {
        Self { store, policy }
    }

    /// Applies one event. Only store failures are errors; every other outcome is
    /// acknowledged so the provider stops redelivering.
    pub async fn apply(&self, event: &SubscriptionEvent) -> Result<ReconcileOutcome, AppError> {
        let Some(plan) = plan(event, self.policy)? else {
            info!(
                provider = event.provider.as_str(),
                event = event.kind.name(),
                "Ignoring unrecognized webhook event"
            );
            return Ok(ReconcileOutcome::Ignored {
                event: event.kind.name().to_string(),
            });
        };

        let outcome = self.store.apply_reconciliation(&plan).await?;

        match &outcome {
            ReconcileOutcome::Applied {
                user_id,
                status,
                is_pro,
            } => info!(
                provider = plan.provider.as_str(),
                event = event.kind.name(),
                subscription = %plan.facts.external_subscription_id,
                user_id = %user_id,
                status = %status,
                is_pro = *is_pro,
                "Applied subscription event"
            ),
            ReconcileOutcome::SubscriptionNotFound {
                external_subscription_id,
            } => warn!(
                provider = plan.provider.as_str(),
                event = event.kind.name(),
                subscription = %external_subscription_id,
                "Subscription event for unknown subscription; acknowledged without changes"
            ),
            ReconcileOutcome::OwnerNotFound {
                external_subscription_id,
            } => warn!(
                provider = plan.provider.as_str(),
                subscription = %external_subscription_id,
                email = ?event.owner.email,
                "No user matches subscription owner; acknowledged without changes"
            ),
            ReconcileOutcome::Ignored { .. } => {}
        }

        Ok(outcome)
    }
}

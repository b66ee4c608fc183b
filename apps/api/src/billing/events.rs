//! Provider-neutral subscription lifecycle events.
//!
//! Both webhook adapters decode their payloads into a [`SubscriptionEvent`]; the
//! reconciler only ever sees this shape.

use chrono::{DateTime, Utc};

use crate::billing::PaymentProvider;

/// Subscription status as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
    Expired,
    Paused,
    /// Any status the reconciler has no rule for (`on_trial`, `past_due`, `unpaid`, ...).
    Other(String),
}

impl SubscriptionStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => SubscriptionStatus::Active,
            "cancelled" | "canceled" => SubscriptionStatus::Cancelled,
            "expired" | "incomplete_expired" => SubscriptionStatus::Expired,
            "paused" => SubscriptionStatus::Paused,
            other => SubscriptionStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Other(raw) => raw,
        }
    }

    /// Only the literal `active` status grants pro.
    pub fn grants_pro(&self) -> bool {
        matches!(self, SubscriptionStatus::Active)
    }
}

/// The lifecycle event kinds the reconciler understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionEventKind {
    Created,
    Updated,
    Cancelled,
    Resumed,
    Expired,
    Paused,
    Unpaused,
    Unknown(String),
}

impl SubscriptionEventKind {
    pub fn from_lemonsqueezy(event_name: &str) -> Self {
        match event_name {
            "subscription_created" => SubscriptionEventKind::Created,
            "subscription_updated" => SubscriptionEventKind::Updated,
            "subscription_cancelled" => SubscriptionEventKind::Cancelled,
            "subscription_resumed" => SubscriptionEventKind::Resumed,
            "subscription_expired" => SubscriptionEventKind::Expired,
            "subscription_paused" => SubscriptionEventKind::Paused,
            "subscription_unpaused" => SubscriptionEventKind::Unpaused,
            other => SubscriptionEventKind::Unknown(other.to_string()),
        }
    }

    pub fn from_stripe(event_type: &str) -> Self {
        match event_type {
            "customer.subscription.created" => SubscriptionEventKind::Created,
            "customer.subscription.updated" => SubscriptionEventKind::Updated,
            // Stripe has no separate expiry event; deletion is the terminal transition.
            "customer.subscription.deleted" => SubscriptionEventKind::Cancelled,
            "customer.subscription.paused" => SubscriptionEventKind::Paused,
            "customer.subscription.resumed" => SubscriptionEventKind::Resumed,
            other => SubscriptionEventKind::Unknown(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SubscriptionEventKind::Created => "created",
            SubscriptionEventKind::Updated => "updated",
            SubscriptionEventKind::Cancelled => "cancelled",
            SubscriptionEventKind::Resumed => "resumed",
            SubscriptionEventKind::Expired => "expired",
            SubscriptionEventKind::Paused => "paused",
            SubscriptionEventKind::Unpaused => "unpaused",
            SubscriptionEventKind::Unknown(name) => name,
        }
    }
}

/// Subscription facts carried by every lifecycle event.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionFacts {
    pub external_subscription_id: String,
    pub external_customer_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
}

/// How to find the owning user when no subscription row exists yet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerHint {
    pub email: Option<String>,
    pub user_id: Option<String>,
}

/// A decoded, signature-verified webhook event.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionEvent {
    pub provider: PaymentProvider,
    pub kind: SubscriptionEventKind,
    /// `None` when the event carries no subscription object (only possible for unknown kinds).
    pub facts: Option<SubscriptionFacts>,
    pub owner: OwnerHint,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parsing_accepts_both_spellings() {
        assert_eq!(SubscriptionStatus::parse("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::parse("Canceled"), SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::parse("cancelled"), SubscriptionStatus::Cancelled);
        assert_eq!(
            SubscriptionStatus::parse("incomplete_expired"),
            SubscriptionStatus::Expired
        );
        assert_eq!(
            SubscriptionStatus::parse("on_trial"),
            SubscriptionStatus::Other("on_trial".to_string())
        );
    }

    #[test]
    fn test_only_active_grants_pro() {
        assert!(SubscriptionStatus::Active.grants_pro());
        for status in ["cancelled", "expired", "paused", "past_due", "on_trial", "unpaid"] {
            assert!(
                !SubscriptionStatus::parse(status).grants_pro(),
                "{status} must not grant pro"
            );
        }
    }

    #[test]
    fn test_lemonsqueezy_event_names() {
        assert_eq!(
            SubscriptionEventKind::from_lemonsqueezy("subscription_unpaused"),
            SubscriptionEventKind::Unpaused
        );
        assert_eq!(
            SubscriptionEventKind::from_lemonsqueezy("subscription_expired"),
            SubscriptionEventKind::Expired
        );
        assert_eq!(
            SubscriptionEventKind::from_lemonsqueezy("order_created"),
            SubscriptionEventKind::Unknown("order_created".to_string())
        );
    }

    #[test]
    fn test_stripe_event_types() {
        assert_eq!(
            SubscriptionEventKind::from_stripe("customer.subscription.deleted"),
            SubscriptionEventKind::Cancelled
        );
        assert_eq!(
            SubscriptionEventKind::from_stripe("customer.subscription.resumed"),
            SubscriptionEventKind::Resumed
        );
        assert_eq!(
            SubscriptionEventKind::from_stripe("invoice.paid").name(),
            "invoice.paid"
        );
    }
}

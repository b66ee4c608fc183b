//! Stripe adapter: decodes `customer.subscription.*` webhook events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::billing::events::{
    OwnerHint, SubscriptionEvent, SubscriptionEventKind, SubscriptionFacts, SubscriptionStatus,
};
use crate::billing::{id_to_string, PaymentProvider};
use crate::errors::AppError;

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    #[serde(default)]
    object: Value,
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    #[serde(default)]
    customer: Value,
    status: String,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    items: Option<StripeList<StripeSubscriptionItem>>,
}

#[derive(Debug, Deserialize)]
struct StripeList<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// Newer API versions report billing periods per item rather than per subscription.
#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
}

/// Decodes a verified Stripe event. Non-subscription events decode to `Unknown`.
pub fn parse_webhook(body: &[u8]) -> Result<SubscriptionEvent, AppError> {
    let event: StripeEvent =
        serde_json::from_slice(body).map_err(|e| AppError::InvalidPayload(e.to_string()))?;

    let kind = SubscriptionEventKind::from_stripe(&event.event_type);
    if let SubscriptionEventKind::Unknown(_) = kind {
        return Ok(SubscriptionEvent {
            provider: PaymentProvider::Stripe,
            kind,
            facts: None,
            owner: OwnerHint::default(),
        });
    }

    let subscription: StripeSubscription = serde_json::from_value(event.data.object)
        .map_err(|e| AppError::InvalidPayload(format!("subscription object: {e}")))?;

    let first_item = subscription
        .items
        .as_ref()
        .and_then(|items| items.data.first());
    let period_start = subscription
        .current_period_start
        .or_else(|| first_item.and_then(|i| i.current_period_start));
    let period_end = subscription
        .current_period_end
        .or_else(|| first_item.and_then(|i| i.current_period_end));

    // The customer is an id, or an expanded object carrying id and email.
    let (customer_id, customer_email) = match &subscription.customer {
        Value::Object(customer) => (
            customer.get("id").and_then(id_to_string),
            customer
                .get("email")
                .and_then(Value::as_str)
                .map(str::to_string),
        ),
        other => (id_to_string(other), None),
    };

    let email = subscription
        .metadata
        .get("email")
        .cloned()
        .or(customer_email)
        .filter(|e| !e.is_empty());

    Ok(SubscriptionEvent {
        provider: PaymentProvider::Stripe,
        kind,
        owner: OwnerHint {
            email,
            user_id: subscription.metadata.get("user_id").cloned(),
        },
        facts: Some(SubscriptionFacts {
            external_subscription_id: subscription.id,
            external_customer_id: customer_id.unwrap_or_default(),
            status: SubscriptionStatus::parse(&subscription.status),
            current_period_start: period_start.and_then(unix_to_utc),
            current_period_end: period_end.and_then(unix_to_utc),
        }),
    })
}

fn unix_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

//! Lemon Squeezy adapter: webhook payload decoding and hosted checkout creation.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::billing::events::{
    OwnerHint, SubscriptionEvent, SubscriptionEventKind, SubscriptionFacts, SubscriptionStatus,
};
use crate::billing::{id_to_string, PaymentProvider};
use crate::errors::AppError;

const CHECKOUT_URL: &str = "https://api.lemonsqueezy.com/v1/checkouts";
const JSON_API: &str = "application/vnd.api+json";
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(30);

// ────────────────────────────────────────────────────────────────────────────
// Webhook payload
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    meta: WebhookMeta,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct WebhookMeta {
    event_name: String,
    #[serde(default)]
    custom_data: Option<HashMap<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionObject {
    id: Value,
    attributes: SubscriptionAttributes,
}

#[derive(Debug, Deserialize)]
struct SubscriptionAttributes {
    #[serde(default)]
    customer_id: Value,
    #[serde(default)]
    user_email: Option<String>,
    status: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    renews_at: Option<DateTime<Utc>>,
    #[serde(default)]
    ends_at: Option<DateTime<Utc>>,
}

/// Decodes a verified webhook body. Unknown event names decode without a subscription object.
pub fn parse_webhook(body: &[u8]) -> Result<SubscriptionEvent, AppError> {
    let payload: WebhookPayload =
        serde_json::from_slice(body).map_err(|e| AppError::InvalidPayload(e.to_string()))?;

    let kind = SubscriptionEventKind::from_lemonsqueezy(&payload.meta.event_name);
    let user_id_hint = payload
        .meta
        .custom_data
        .as_ref()
        .and_then(|custom| custom.get("user_id"))
        .and_then(id_to_string);

    if let SubscriptionEventKind::Unknown(_) = kind {
        return Ok(SubscriptionEvent {
            provider: PaymentProvider::LemonSqueezy,
            kind,
            facts: None,
            owner: OwnerHint {
                email: None,
                user_id: user_id_hint,
            },
        });
    }

    let object: SubscriptionObject = serde_json::from_value(payload.data)
        .map_err(|e| AppError::InvalidPayload(format!("subscription object: {e}")))?;
    let external_subscription_id = id_to_string(&object.id)
        .ok_or_else(|| AppError::InvalidPayload("subscription id is missing".to_string()))?;
    let attributes = object.attributes;

    Ok(SubscriptionEvent {
        provider: PaymentProvider::LemonSqueezy,
        kind,
        facts: Some(SubscriptionFacts {
            external_subscription_id,
            external_customer_id: id_to_string(&attributes.customer_id).unwrap_or_default(),
            status: SubscriptionStatus::parse(&attributes.status),
            current_period_start: attributes.created_at,
            current_period_end: attributes.renews_at.or(attributes.ends_at),
        }),
        owner: OwnerHint {
            email: attributes.user_email.filter(|e| !e.is_empty()),
            user_id: user_id_hint,
        },
    })
}

// ────────────────────────────────────────────────────────────────────────────
// Checkout
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CheckoutResponse {
    data: CheckoutData,
}

#[derive(Debug, Deserialize)]
struct CheckoutData {
    attributes: CheckoutAttributes,
}

#[derive(Debug, Deserialize)]
struct CheckoutAttributes {
    #[serde(default)]
    url: String,
}

/// Creates hosted checkout sessions. Credentials are passed in; nothing is global.
#[derive(Clone)]
pub struct LemonSqueezyClient {
    client: Client,
    api_key: String,
    store_id: String,
    product_id: String,
    redirect_url: Option<String>,
}

impl LemonSqueezyClient {
    pub fn new(
        api_key: String,
        store_id: String,
        product_id: String,
        redirect_url: Option<String>,
    ) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(CHECKOUT_TIMEOUT)
            .build()
            .map_err(|e| AppError::Payment(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key,
            store_id,
            product_id,
            redirect_url,
        })
    }

    /// Returns the hosted checkout URL for this user.
    pub async fn create_checkout(&self, user_id: &str, email: &str) -> Result<String, AppError> {
        let body = self.checkout_body(user_id, email);

        let response = self
            .client
            .post(CHECKOUT_URL)
            .header("Accept", JSON_API)
            .header("Content-Type", JSON_API)
            .bearer_auth(&self.api_key)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| AppError::Payment(format!("checkout request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::Payment(format!(
                "Lemon Squeezy API error: {status} - {text}"
            )));
        }

        let checkout: CheckoutResponse = response
            .json()
            .await
            .map_err(|e| AppError::Payment(format!("undecodable checkout response: {e}")))?;

        let url = checkout.data.attributes.url;
        if url.is_empty() {
            return Err(AppError::Payment(
                "no checkout URL returned from Lemon Squeezy".to_string(),
            ));
        }

        info!("Created checkout session for user {user_id}");
        Ok(url)
    }

    fn checkout_body(&self, user_id: &str, email: &str) -> Value {
        let mut product_options = json!({});
        if let Some(redirect) = &self.redirect_url {
            product_options["redirect_url"] = json!(redirect);
        }

        json!({
            "data": {
                "type": "checkouts",
                "attributes": {
                    "checkout_options": { "embed": false, "media": false, "logo": true },
                    "checkout_data": {
                        "email": email,
                        "custom": { "user_id": user_id }
                    },
                    "product_options": product_options
                },
                "relationships": {
                    "store": { "data": { "type": "stores", "id": self.store_id } },
                    "product": { "data": { "type": "products", "id": self.product_id } }
                }
            }
        })
    }
}

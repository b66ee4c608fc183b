// Subscription billing: webhook verification, provider adapters, reconciliation.
// Provider payloads never reach the reconciler directly; adapters decode them into
// provider-neutral events first.

pub mod events;
pub mod handlers;
pub mod lemonsqueezy;
pub mod reconciler;
pub mod signature;
pub mod stripe;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider {
    Stripe,
    LemonSqueezy,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::LemonSqueezy => "lemonsqueezy",
        }
    }
}

/// Provider ids arrive as JSON numbers (Lemon Squeezy) or strings (Stripe).
pub(crate) fn id_to_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

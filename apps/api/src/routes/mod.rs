pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::billing::handlers as billing;
use crate::billing::PaymentProvider;
use crate::rewrite::handlers as rewrite;
use crate::state::AppState;

/// Only the configured provider's webhook is mounted; checkout exists for Lemon Squeezy only.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route("/health", get(health::health_handler))
        // Rewrite API
        .route("/api/rewrite", post(rewrite::handle_rewrite))
        .route("/api/usage/:user_id", get(rewrite::handle_get_usage))
        .route("/api/emails/:user_id", get(rewrite::handle_get_emails));

    // Billing API
    let router = match state.billing.provider() {
        PaymentProvider::LemonSqueezy => router
            .route("/api/checkout", post(billing::handle_create_checkout))
            .route(
                "/api/lemonsqueezy/webhook",
                post(billing::handle_lemonsqueezy_webhook),
            ),
        PaymentProvider::Stripe => {
            router.route("/api/stripe/webhook", post(billing::handle_stripe_webhook))
        }
    };

    router.with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::billing::reconciler::{Reconciler, ReconcilerPolicy};
    use crate::billing::signature::tests::{sign_lemonsqueezy, sign_stripe};
    use crate::config::BillingConfig;
    use crate::llm_client::rewriter::EmailRewriter;
    use crate::llm_client::tone::Tone;
    use crate::llm_client::LlmError;
    use crate::store::memory::InMemoryStore;

    const SECRET: &str = "whsec_test_secret";

    struct CannedRewriter;

    #[async_trait]
    impl EmailRewriter for CannedRewriter {
        async fn rewrite(&self, text: &str, tone: Tone) -> Result<String, LlmError> {
            Ok(format!("[{}] {text}", tone.label()))
        }

        async fn roast(&self, _text: &str) -> Result<String, LlmError> {
            Err(LlmError::EmptyContent)
        }
    }

    fn app(store: &Arc<InMemoryStore>, billing: BillingConfig) -> Router {
        build_router(AppState {
            store: store.clone(),
            rewriter: Arc::new(CannedRewriter),
            reconciler: Reconciler::new(store.clone(), ReconcilerPolicy::default()),
            checkout: None,
            billing,
        })
    }

    fn lemonsqueezy_app(store: &Arc<InMemoryStore>) -> Router {
        app(
            store,
            BillingConfig::LemonSqueezy {
                api_key: "ls-key".to_string(),
                webhook_secret: SECRET.to_string(),
                store_id: "186706".to_string(),
                product_id: "554519".to_string(),
                redirect_url: None,
            },
        )
    }

    fn stripe_app(store: &Arc<InMemoryStore>) -> Router {
        app(
            store,
            BillingConfig::Stripe {
                webhook_secret: SECRET.to_string(),
            },
        )
    }

    fn store_with_user() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::default());
        store.insert_user("u1", "alice@example.com", false);
        store
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn fetch(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn rewrite_request(email: &str) -> Request<Body> {
        post_json(
            "/api/rewrite",
            json!({ "email": email, "tone": "Direct", "user_id": "u1" }),
        )
    }

    fn webhook(uri: &str, header: &str, signature: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header(header, signature)
            .body(Body::from(body))
            .unwrap()
    }

    fn lemonsqueezy_event(event_name: &str, status: &str) -> Vec<u8> {
        json!({
            "meta": { "event_name": event_name, "custom_data": { "user_id": "u1" } },
            "data": {
                "type": "subscriptions",
                "id": "1",
                "attributes": {
                    "customer_id": 42,
                    "user_email": "alice@example.com",
                    "status": status,
                    "created_at": "2024-01-01T00:00:00.000000Z",
                    "renews_at": "2024-02-01T00:00:00.000000Z"
                }
            }
        })
        .to_string()
        .into_bytes()
    }

    fn signed_lemonsqueezy(body: Vec<u8>) -> Request<Body> {
        let signature = sign_lemonsqueezy(&body, SECRET);
        webhook("/api/lemonsqueezy/webhook", "X-Signature", &signature, body)
    }

    #[tokio::test]
    async fn test_health() {
        let store = Arc::new(InMemoryStore::default());
        let (status, body) = send(&lemonsqueezy_app(&store), fetch("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_rewrite_then_usage_is_one() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        let (status, body) = send(&app, rewrite_request("hi there")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body["rewritten"].as_str().unwrap().is_empty());
        assert!(body.get("roast").is_none());

        let (status, body) = send(&app, fetch("/api/usage/u1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "usage": 1, "is_pro": false, "limit": 5 }));
    }

    #[tokio::test]
    async fn test_sixth_rewrite_is_rejected_without_writing() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        for i in 0..5 {
            let (status, _) = send(&app, rewrite_request(&format!("email {i}"))).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app, rewrite_request("one too many")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"]["code"], "QUOTA_EXCEEDED");
        assert_eq!(store.email_count("u1"), 5);

        let (_, body) = send(&app, fetch("/api/usage/u1")).await;
        assert_eq!(body["usage"], 5);
    }

    #[tokio::test]
    async fn test_failed_roast_still_returns_rewrite() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        let request = post_json(
            "/api/rewrite",
            json!({ "email": "hi", "tone": "karen", "roast": true, "user_id": "u1" }),
        );
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["rewritten"], "[Karen] hi");
        assert!(body.get("roast").is_none());
        assert_eq!(store.email_count("u1"), 1);
    }

    #[tokio::test]
    async fn test_rewrite_validation() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        let malformed = Request::builder()
            .method("POST")
            .uri("/api/rewrite")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, _) = send(&app, malformed).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing_user = post_json("/api/rewrite", json!({ "email": "hi", "tone": "Direct" }));
        let (status, _) = send(&app, missing_user).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let blank_email = post_json(
            "/api/rewrite",
            json!({ "email": "  ", "tone": "Direct", "user_id": "u1" }),
        );
        let (status, _) = send(&app, blank_email).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(store.email_count("u1"), 0);
    }

    #[tokio::test]
    async fn test_unknown_user_is_not_found() {
        let store = Arc::new(InMemoryStore::default());
        let app = lemonsqueezy_app(&store);

        let (status, _) = send(&app, rewrite_request("hi")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, fetch("/api/usage/u1")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_emails_newest_first_with_limit() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        for email in ["one", "two", "three"] {
            let (status, _) = send(&app, rewrite_request(email)).await;
            assert_eq!(status, StatusCode::OK);
        }

        let (status, body) = send(&app, fetch("/api/emails/u1?limit=2")).await;
        assert_eq!(status, StatusCode::OK);
        let emails = body["emails"].as_array().unwrap();
        assert_eq!(emails.len(), 2);
        assert_eq!(emails[0]["original"], "three");
        assert_eq!(emails[1]["original"], "two");
        assert_eq!(emails[0]["tone"], "Direct");

        let (_, body) = send(&app, fetch("/api/emails/u1?limit=abc")).await;
        assert_eq!(body["emails"].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_signed_created_event_grants_pro_once() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        for _ in 0..2 {
            let request = signed_lemonsqueezy(lemonsqueezy_event("subscription_created", "active"));
            let (status, body) = send(&app, request).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, json!({ "received": true }));
        }

        assert!(store.user("u1").unwrap().is_pro);
        assert_eq!(store.subscription_count(), 1);

        let (_, body) = send(&app, fetch("/api/usage/u1")).await;
        assert_eq!(body["is_pro"], true);
    }

    #[tokio::test]
    async fn test_tampered_webhook_is_rejected_before_parsing() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        let body = lemonsqueezy_event("subscription_created", "active");
        let signature = sign_lemonsqueezy(&body, SECRET);
        let mut tampered = body.clone();
        tampered[0] = b'X';

        let request = webhook("/api/lemonsqueezy/webhook", "X-Signature", &signature, tampered);
        let (status, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "INVALID_SIGNATURE");
        assert_eq!(store.subscription_count(), 0);
        assert!(!store.user("u1").unwrap().is_pro);
    }

    #[tokio::test]
    async fn test_unsigned_webhook_is_rejected() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        let request = post_json("/api/lemonsqueezy/webhook", json!({ "meta": {} }));
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unknown_event_is_acknowledged() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        let body = json!({ "meta": { "event_name": "order_created" }, "data": {} })
            .to_string()
            .into_bytes();
        let (status, body) = send(&app, signed_lemonsqueezy(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["received"], true);
        assert_eq!(body["event"], "order_created");
        assert_eq!(store.subscription_count(), 0);
    }

    #[tokio::test]
    async fn test_checkout_requires_fields() {
        let store = store_with_user();
        let app = lemonsqueezy_app(&store);

        let request = post_json("/api/checkout", json!({ "user_id": "u1", "email": "" }));
        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_stripe_deployment_routes() {
        let store = store_with_user();
        let app = stripe_app(&store);

        let (status, _) = send(&app, post_json("/api/checkout", json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let body = json!({
            "id": "evt_1",
            "type": "customer.subscription.created",
            "data": { "object": {
                "id": "sub_123",
                "customer": "cus_9",
                "status": "active",
                "metadata": { "email": "Alice@Example.com" }
            }}
        })
        .to_string()
        .into_bytes();
        let signature = sign_stripe(&body, SECRET, chrono::Utc::now().timestamp());
        let request = webhook("/api/stripe/webhook", "Stripe-Signature", &signature, body);

        let (status, _) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(store.user("u1").unwrap().is_pro);
        assert_eq!(store.subscription("sub_123").unwrap().provider, "stripe");
    }
}

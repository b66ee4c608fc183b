use std::sync::Arc;

use crate::billing::lemonsqueezy::LemonSqueezyClient;
use crate::billing::reconciler::Reconciler;
use crate::config::BillingConfig;
use crate::llm_client::rewriter::EmailRewriter;
use crate::store::EntitlementStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntitlementStore>,
    /// Default: `LlmClient`. Tests swap in a canned rewriter.
    pub rewriter: Arc<dyn EmailRewriter>,
    pub reconciler: Reconciler,
    /// Present only for Lemon Squeezy deployments.
    pub checkout: Option<LemonSqueezyClient>,
    /// Active payment provider and its webhook secret.
    pub billing: BillingConfig,
}

mod billing;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod quota;
mod rewrite;
mod routes;
mod state;
mod store;

use anyhow::Result;
use axum::http::{header, HeaderValue, Method};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::billing::lemonsqueezy::LemonSqueezyClient;
use crate::billing::reconciler::{Reconciler, ReconcilerPolicy};
use crate::config::{BillingConfig, Config};
use crate::db::{create_pool, run_migrations};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::postgres::PgEntitlementStore;
use crate::store::EntitlementStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_CRATE_NAME"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting EmailDrip API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;
    let store: Arc<dyn EntitlementStore> = Arc::new(PgEntitlementStore::new(db));

    // Initialize LLM client
    let llm = LlmClient::new(
        config.openrouter_api_key.clone(),
        Duration::from_secs(config.completion_timeout_secs),
    )?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Initialize billing
    let policy = ReconcilerPolicy {
        paused_keeps_pro: config.paused_keeps_pro,
    };
    let reconciler = Reconciler::new(store.clone(), policy);
    let checkout = match &config.billing {
        BillingConfig::LemonSqueezy {
            api_key,
            store_id,
            product_id,
            redirect_url,
            ..
        } => Some(LemonSqueezyClient::new(
            api_key.clone(),
            store_id.clone(),
            product_id.clone(),
            redirect_url.clone(),
        )?),
        BillingConfig::Stripe { .. } => None,
    };
    info!(
        provider = config.billing.provider().as_str(),
        paused_keeps_pro = policy.paused_keeps_pro,
        "Billing initialized"
    );

    // Build app state
    let state = AppState {
        store,
        rewriter: Arc::new(llm),
        reconciler,
        checkout,
        billing: config.billing.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins));

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Restricts cross-origin access to the configured frontends.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{origin}'");
                None
            }
        })
        .collect();

    info!(allowed_origins = ?allowed, "CORS configured");

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::ORIGIN,
        ])
        .allow_credentials(true)
}

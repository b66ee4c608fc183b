use anyhow::{bail, Context, Result};

use crate::billing::PaymentProvider;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub openrouter_api_key: String,
    pub completion_timeout_secs: u64,
    pub billing: BillingConfig,
    /// Whether a paused subscription keeps the pro entitlement.
    pub paused_keeps_pro: bool,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub rust_log: String,
}

/// Payment provider settings. Exactly one provider is active per deployment.
#[derive(Debug, Clone)]
pub enum BillingConfig {
    Stripe {
        webhook_secret: String,
    },
    LemonSqueezy {
        api_key: String,
        webhook_secret: String,
        store_id: String,
        product_id: String,
        redirect_url: Option<String>,
    },
}

impl BillingConfig {
    pub fn provider(&self) -> PaymentProvider {
        match self {
            BillingConfig::Stripe { .. } => PaymentProvider::Stripe,
            BillingConfig::LemonSqueezy { .. } => PaymentProvider::LemonSqueezy,
        }
    }

    pub fn webhook_secret(&self) -> &str {
        match self {
            BillingConfig::Stripe { webhook_secret } => webhook_secret,
            BillingConfig::LemonSqueezy { webhook_secret, .. } => webhook_secret,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |key: &str| -> Result<String> {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Required environment variable '{key}' is not set"))
        };

        let database_url = match lookup("DATABASE_URL").filter(|v| !v.trim().is_empty()) {
            Some(url) => url,
            None => database_url_from_parts(
                &require("DB_USER")?,
                &require("DB_PASSWORD")?,
                &require("DB_HOST")?,
                &require("DB_PORT")?,
                &require("DB_NAME")?,
            ),
        };

        let provider = lookup("BILLING_PROVIDER").unwrap_or_else(|| "lemonsqueezy".to_string());
        let billing = match provider.trim().to_ascii_lowercase().as_str() {
            "stripe" => BillingConfig::Stripe {
                webhook_secret: require("STRIPE_WEBHOOK_SECRET")?,
            },
            "lemonsqueezy" | "lemon_squeezy" => BillingConfig::LemonSqueezy {
                api_key: require("LEMONSQUEEZY_API_KEY")?,
                webhook_secret: require("LEMONSQUEEZY_WEBHOOK_SECRET")?,
                store_id: require("LEMONSQUEEZY_STORE_ID")?,
                product_id: require("LEMONSQUEEZY_PRODUCT_ID")?,
                redirect_url: lookup("LEMONSQUEEZY_REDIRECT_URL").filter(|v| !v.is_empty()),
            },
            other => bail!("BILLING_PROVIDER must be 'stripe' or 'lemonsqueezy', got '{other}'"),
        };

        Ok(Config {
            database_url,
            openrouter_api_key: require("OPENROUTER_API_KEY")?,
            completion_timeout_secs: lookup("COMPLETION_TIMEOUT_SECS")
                .unwrap_or_else(|| "30".to_string())
                .parse::<u64>()
                .context("COMPLETION_TIMEOUT_SECS must be a whole number of seconds")?,
            billing,
            paused_keeps_pro: lookup("PAUSED_KEEPS_PRO")
                .map(|v| parse_flag(&v))
                .transpose()
                .context("PAUSED_KEEPS_PRO must be true or false")?
                .unwrap_or(true),
            port: lookup("PORT")
                .unwrap_or_else(|| "8080".to_string())
                .parse::<u16>()
                .context("PORT must be a valid port number")?,
            allowed_origins: parse_origins(
                &lookup("ALLOWED_ORIGINS").unwrap_or_else(|| "http://localhost:5173".to_string()),
            ),
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

/// Assembles a connection URL from discrete settings when `DATABASE_URL` is absent.
pub fn database_url_from_parts(
    user: &str,
    password: &str,
    host: &str,
    port: &str,
    name: &str,
) -> String {
    format!("postgres://{user}:{password}@{host}:{port}/{name}?sslmode=require")
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("not a boolean: '{other}'"),
    }
}

use std::fmt;

use anyhow::{bail, Context};
use serde::Deserialize;
use tracing::warn;

#[derive(Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("ttl_minutes", &self.ttl_minutes)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub api_base: String,
    pub currency: String,
    pub timeout_secs: u64,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("key_id", &self.key_id)
            .field("key_secret", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("currency", &self.currency)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// When set, a checkout for an email that already has an account must
    /// carry that account's password.
    pub verify_returning_buyer: bool,
}

#[derive(Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt: JwtConfig,
    pub gateway: GatewayConfig,
    pub checkout: CheckoutConfig,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"<redacted>")
            .field("database_max_connections", &self.database_max_connections)
            .field("jwt", &self.jwt)
            .field("gateway", &self.gateway)
            .field("checkout", &self.checkout)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt = JwtConfig {
            secret: required_secret("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "coursecart".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "coursecart-users".into()),
            ttl_minutes: parsed_or("JWT_TTL_MINUTES", 60 * 24 * 7),
        };
        let gateway = GatewayConfig {
            key_id: std::env::var("RAZORPAY_KEY_ID").context("RAZORPAY_KEY_ID must be set")?,
            key_secret: required_secret("RAZORPAY_KEY_SECRET")?,
            api_base: std::env::var("RAZORPAY_API_BASE")
                .unwrap_or_else(|_| "https://api.razorpay.com/v1".into()),
            currency: std::env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".into()),
            timeout_secs: parsed_or("GATEWAY_TIMEOUT_SECS", 10),
        };
        let checkout = CheckoutConfig {
            verify_returning_buyer: parsed_or("CHECKOUT_VERIFY_RETURNING_BUYER", true),
        };
        Ok(Self {
            database_url,
            database_max_connections: parsed_or("DATABASE_MAX_CONNECTIONS", 10),
            jwt,
            gateway,
            checkout,
        })
    }
}

fn required_secret(key: &str) -> anyhow::Result<String> {
    let value = std::env::var(key).with_context(|| format!("{key} must be set"))?;
    if value.trim().is_empty() {
        bail!("{key} must not be empty");
    }
    Ok(value)
}

fn parsed_or<T: std::str::FromStr + fmt::Debug>(key: &str, default: T) -> T {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) => value,
        Err(_) => {
            warn!(key, value = %raw, fallback = ?default, "unparseable setting ignored");
            default
        }
    }
}

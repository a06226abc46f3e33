//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// API server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// Redis URL for sessions and locks.
    pub redis_url: String,
    /// Session and lock TTL.
    pub session_ttl: Duration,
    /// The bot's own phone number, for the post-payment deep link.
    pub bot_phone: String,
    /// WhatsApp Cloud API access token.
    pub whatsapp_access_token: String,
    /// WhatsApp business phone number id.
    pub whatsapp_phone_number_id: String,
    /// Shared secret for webhook verification.
    pub whatsapp_verify_token: String,
    /// STK provider keys.
    pub stk_publishable_key: String,
    pub stk_secret_key: String,
    pub stk_is_test: bool,
    /// Hosted provider settings.
    pub hosted_base_url: String,
    pub hosted_consumer_key: String,
    pub hosted_consumer_secret: String,
    pub hosted_callback_url: String,
    pub hosted_ipn_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `BIND_ADDR` | Server bind address | `127.0.0.1:8080` |
    /// | `DATABASE_URL` | SQLite database URL | `sqlite:tikiti.db?mode=rwc` |
    /// | `REDIS_URL` | Redis URL for sessions/locks | `redis://127.0.0.1:6379` |
    /// | `SESSION_TTL` | Session and lock TTL, seconds | `600` |
    /// | `BOT_PHONE` | The bot's own number | (required) |
    /// | `WHATSAPP_ACCESS_TOKEN` | Cloud API token | (required) |
    /// | `WHATSAPP_PHONE_NUMBER_ID` | Cloud API phone number id | (required) |
    /// | `WHATSAPP_VERIFY_TOKEN` | Webhook verification secret | (required) |
    /// | `STK_PUBLISHABLE_KEY` | STK provider key | (required) |
    /// | `STK_SECRET_KEY` | STK provider secret | (required) |
    /// | `STK_IS_TEST` | STK sandbox switch | `true` |
    /// | `HOSTED_BASE_URL` | Hosted provider base URL | provider default |
    /// | `HOSTED_CONSUMER_KEY` | Hosted provider key | (required) |
    /// | `HOSTED_CONSUMER_SECRET` | Hosted provider secret | (required) |
    /// | `HOSTED_CALLBACK_URL` | Post-payment browser redirect | `https://wa.me/<BOT_PHONE>` |
    /// | `HOSTED_IPN_URL` | Payment notification endpoint | callback URL |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:tikiti.db?mode=rwc".to_string());
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let session_ttl = env::var("SESSION_TTL")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(600));

        let bot_phone = require("BOT_PHONE")?;
        let whatsapp_access_token = require("WHATSAPP_ACCESS_TOKEN")?;
        let whatsapp_phone_number_id = require("WHATSAPP_PHONE_NUMBER_ID")?;
        let whatsapp_verify_token = require("WHATSAPP_VERIFY_TOKEN")?;

        let stk_publishable_key = require("STK_PUBLISHABLE_KEY")?;
        let stk_secret_key = require("STK_SECRET_KEY")?;
        let stk_is_test = env::var("STK_IS_TEST")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(true);

        let hosted_base_url = env::var("HOSTED_BASE_URL")
            .unwrap_or_else(|_| "https://pay.pesapal.com/v3".to_string());
        let hosted_consumer_key = require("HOSTED_CONSUMER_KEY")?;
        let hosted_consumer_secret = require("HOSTED_CONSUMER_SECRET")?;
        let hosted_callback_url = env::var("HOSTED_CALLBACK_URL")
            .unwrap_or_else(|_| format!("https://wa.me/{bot_phone}"));
        let hosted_ipn_url =
            env::var("HOSTED_IPN_URL").unwrap_or_else(|_| hosted_callback_url.clone());

        Ok(Self {
            addr,
            database_url,
            redis_url,
            session_ttl,
            bot_phone,
            whatsapp_access_token,
            whatsapp_phone_number_id,
            whatsapp_verify_token,
            stk_publishable_key,
            stk_secret_key,
            stk_is_test,
            hosted_base_url,
            hosted_consumer_key,
            hosted_consumer_secret,
            hosted_callback_url,
            hosted_ipn_url,
        })
    }
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::Missing(key))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid BIND_ADDR format")]
    InvalidAddr,

    #[error("{0} environment variable is required")]
    Missing(&'static str),
}

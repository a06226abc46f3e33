//! Tikiti API server.
//!
//! Wires the database, session store, lock registry, messaging client and
//! payment adapters into the concierge and exposes the webhook routes. Every
//! collaborator is constructed here and threaded as a dependency; there are
//! no process-wide singletons beyond the connection pools.

mod config;
mod routes;
mod state;

use std::sync::Arc;

use database::Database;
use payments::{HostedClient, HostedConfig, StkClient, StkConfig};
use session::{LockRegistry, SessionStore};
use tower_http::trace::TraceLayer;
use tracing::info;
use whatsapp::{WhatsappClient, WhatsappConfig};

use crate::config::Config;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    info!(addr = %config.addr, "Starting Tikiti API server");

    // Database
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    // Sessions and locks share one Redis connection; both degrade gracefully
    // when it is absent.
    let redis = session::connect_redis(&config.redis_url).await;
    let sessions = SessionStore::new(redis.clone(), config.session_ttl);
    let locks = LockRegistry::new(redis);

    // Messaging client
    let whatsapp = WhatsappClient::new(WhatsappConfig::new(
        &config.whatsapp_access_token,
        &config.whatsapp_phone_number_id,
    ))?;

    // Payment adapters
    let stk = StkClient::new(StkConfig {
        publishable_key: config.stk_publishable_key.clone(),
        secret_key: config.stk_secret_key.clone(),
        is_test: config.stk_is_test,
        base_url: None,
    })?;
    let hosted = HostedClient::new(HostedConfig {
        base_url: config.hosted_base_url.clone(),
        consumer_key: config.hosted_consumer_key.clone(),
        consumer_secret: config.hosted_consumer_secret.clone(),
        callback_url: config.hosted_callback_url.clone(),
        ipn_url: config.hosted_ipn_url.clone(),
    })?;

    let concierge = concierge::Concierge::new(
        db,
        sessions,
        locks,
        Arc::new(whatsapp),
        Arc::new(stk),
        Arc::new(hosted),
        Arc::new(concierge::QrTicketRenderer),
    );

    let state = AppState::new(concierge, config.whatsapp_verify_token.clone());

    let app = routes::router()
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.addr).await?;
    info!(addr = %config.addr, "Tikiti API server listening");
    axum::serve(listener, app).await?;

    Ok(())
}

//! HTTP routes: health, the messaging webhook and the payment webhooks.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use concierge::StkWebhook;
use whatsapp::{verify_subscription, WebhookPayload};

use crate::state::AppState;

/// Build the application router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(verify_webhook).post(user_webhook))
        .route("/webhooks/stk", post(stk_webhook))
        .route("/webhooks/hosted", get(hosted_ping).post(hosted_webhook))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// The platform's webhook verification handshake.
#[derive(Debug, Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode", default)]
    mode: String,
    #[serde(rename = "hub.verify_token", default)]
    verify_token: String,
    #[serde(rename = "hub.challenge", default)]
    challenge: String,
}

async fn verify_webhook(
    State(state): State<AppState>,
    Query(params): Query<VerifyParams>,
) -> Response {
    match verify_subscription(
        &params.mode,
        &params.verify_token,
        &params.challenge,
        &state.verify_token,
    ) {
        Some(challenge) => (StatusCode::OK, challenge).into_response(),
        None => StatusCode::FORBIDDEN.into_response(),
    }
}

/// Inbound user messages. Replies 200 immediately, whatever the payload
/// looked like; processing happens in the background and failures are
/// logged, never propagated.
async fn user_webhook(State(state): State<AppState>, body: Bytes) -> StatusCode {
    match serde_json::from_slice::<WebhookPayload>(&body) {
        Ok(payload) => {
            tokio::spawn(async move {
                state.concierge.handle_user_webhook(&payload).await;
            });
        }
        Err(e) => warn!(error = %e, "Unparsable user webhook payload"),
    }
    StatusCode::OK
}

/// The STK provider's payment webhook. Always acknowledged with the
/// provider's expected body, even for unparsable payloads.
async fn stk_webhook(State(state): State<AppState>, body: Bytes) -> &'static str {
    match serde_json::from_slice::<StkWebhook>(&body) {
        Ok(payload) => state.concierge.handle_stk_webhook(&payload).await,
        Err(e) => {
            warn!(error = %e, "Unparsable STK webhook payload");
            concierge::STK_ACK
        }
    }
}

/// Inputs to the hosted provider's webhook, via query or body.
#[derive(Debug, Clone, Default, Deserialize)]
struct HostedParams {
    #[serde(rename = "OrderTrackingId", default)]
    order_tracking_id: String,
    #[serde(rename = "OrderNotificationType", default)]
    order_notification_type: String,
}

/// GET: the provider's URL-validation ping. Pure echo, no side effects.
async fn hosted_ping(
    State(state): State<AppState>,
    Query(params): Query<HostedParams>,
) -> Response {
    let ack = state
        .concierge
        .hosted_ping(&params.order_tracking_id, &params.order_notification_type);
    Json(ack).into_response()
}

/// POST: a payment notification. The body is always the echo shape with
/// `status` mirroring the outcome.
async fn hosted_webhook(
    State(state): State<AppState>,
    Query(query): Query<HostedParams>,
    body: Option<Json<HostedParams>>,
) -> Response {
    let params = if query.order_tracking_id.is_empty() {
        body.map(|b| b.0).unwrap_or_default()
    } else {
        query
    };

    debug!(tracking_id = %params.order_tracking_id, "Hosted payment notification");

    let ack = state
        .concierge
        .handle_hosted_webhook(&params.order_tracking_id, &params.order_notification_type)
        .await;
    let status =
        StatusCode::from_u16(ack.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(ack)).into_response()
}

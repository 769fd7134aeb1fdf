//! Axum router configuration for the webhook endpoint.

use axum::{
    routing::{get, post},
    Router,
};

use crate::config::WEBHOOK_PATH;

use super::handlers::{health, receive_webhook, WebhookAppState};

/// Create the webhook router.
///
/// # Routes
/// - `POST /webhooks/vipps` - Provider deliveries (signature verified, no auth)
/// - `GET /health` - Liveness check
///
/// The peer address comes from `ConnectInfo`, so serve with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn webhook_router() -> Router<WebhookAppState> {
    Router::new()
        .route(WEBHOOK_PATH, post(receive_webhook))
        .route("/health", get(health))
}

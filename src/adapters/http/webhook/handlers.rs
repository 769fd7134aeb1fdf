//! HTTP handlers for the webhook endpoint.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Json, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::application::{HandleWebhookHandler, WebhookRequest};
use crate::domain::webhook::WebhookRejection;

use super::dto::{HealthResponse, WebhookAckResponse};

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct WebhookAppState {
    pub handler: Arc<HandleWebhookHandler>,
    /// Take the peer address from `X-Forwarded-For` (behind a trusted proxy).
    pub trust_forwarded_for: bool,
}

impl WebhookAppState {
    pub fn new(handler: Arc<HandleWebhookHandler>) -> Self {
        Self {
            handler,
            trust_forwarded_for: false,
        }
    }

    pub fn with_trust_forwarded_for(mut self, trust: bool) -> Self {
        self.trust_forwarded_for = trust;
        self
    }

    fn peer_address(&self, headers: &HeaderMap, connected: Option<SocketAddr>) -> Option<IpAddr> {
        if self.trust_forwarded_for {
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .and_then(|first| first.trim().parse::<IpAddr>().ok());
            if forwarded.is_some() {
                return forwarded;
            }
        }
        connected.map(|addr| addr.ip())
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /webhooks/vipps
pub async fn receive_webhook(
    State(state): State<WebhookAppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAckResponse>, WebhookApiError> {
    let peer = state.peer_address(&headers, connect_info.map(|ConnectInfo(addr)| addr));
    let request = WebhookRequest {
        headers,
        body: body.to_vec(),
        peer,
    };

    let disposition = state.handler.handle(request).await?;
    Ok(Json(WebhookAckResponse::from(&disposition)))
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// Converts a rejection into the status the provider acts on.
pub struct WebhookApiError(WebhookRejection);

impl From<WebhookRejection> for WebhookApiError {
    fn from(err: WebhookRejection) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status: StatusCode = self.0.status_code();
        let body = Json(WebhookAckResponse::from(&self.0));

        if let WebhookRejection::RateLimited { retry_after_secs } = &self.0 {
            let mut response = (status, body).into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            return response;
        }

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_response_carries_retry_after() {
        let response =
            WebhookApiError(WebhookRejection::RateLimited { retry_after_secs: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }

    #[test]
    fn storage_failure_is_500_so_provider_redelivers() {
        let response =
            WebhookApiError(WebhookRejection::Storage("pool timed out".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

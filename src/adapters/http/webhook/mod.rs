//! HTTP adapter for inbound provider webhooks.
//!
//! - `POST /webhooks/vipps` - Validate and apply a delivery
//! - `GET /health` - Liveness check
//!
//! Status codes tell the provider whether to redeliver: 2xx and 4xx stop
//! redelivery, 5xx triggers it.

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::{HealthResponse, WebhookAckResponse};
pub use handlers::{WebhookApiError, WebhookAppState};
pub use routes::webhook_router;

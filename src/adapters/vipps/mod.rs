//! Vipps/MobilePay ePayment adapter.
//!
//! Implements the `PaymentGateway` port for the Vipps ePayment and webhooks
//! APIs, including:
//! - Access token lifecycle (cached, single-flight refresh)
//! - Idempotency keys on every mutating call
//! - Rate limiting and circuit breaking per API host
//! - Retries with exponential backoff and jitter
//!
//! # Security
//!
//! - Client secret and subscription key are held in `secrecy::SecretString`
//! - Webhook secrets are provider-issued and returned verbatim

mod client;
mod mock_gateway;
mod retry;
mod token_cache;
mod wire_types;

pub use client::{SystemInfo, VippsClient, VippsConfig};
pub use mock_gateway::{GatewayCall, MockPaymentGateway};
pub use retry::RetryPolicy;
pub use token_cache::{TokenCache, DEFAULT_REFRESH_MARGIN};
pub use wire_types::{AccessTokenResponse, PaymentResponse, ProblemDetails, VippsAmount};

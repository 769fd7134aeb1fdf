//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `vipps` - ePayment and webhook management API client, plus a mock
//! - `http` - Inbound webhook endpoint (axum)
//! - `memory` - In-memory repositories and event store
//! - `postgres` - PostgreSQL repositories and event store
//! - `circuit_breaker` - Per-host breaker for outbound calls
//! - `rate_limiter` - Sliding-window limiter for outbound calls and webhook peers
//! - `dns` - Host resolvers for the webhook source check
//! - `notify` - Host notifiers

pub mod circuit_breaker;
pub mod dns;
pub mod http;
pub mod memory;
pub mod notify;
pub mod postgres;
pub mod rate_limiter;
pub mod vipps;

pub use circuit_breaker::InMemoryCircuitBreaker;
pub use memory::{InMemoryEventStore, InMemoryTransactionRepository};
pub use notify::{ChannelNotifier, TracingNotifier};
pub use rate_limiter::InMemoryRateLimiter;
pub use vipps::{MockPaymentGateway, VippsClient, VippsConfig};

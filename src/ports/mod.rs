//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Provider Ports
//!
//! - `PaymentGateway` - ePayment and webhook-subscription API
//! - `HostResolver` - DNS lookups for callback source checks
//!
//! ## Host Collaborator Ports
//!
//! - `TransactionRepository` - Transaction persistence
//! - `EventStore` - Webhook deduplication records
//! - `HostNotifier` - State change notifications to the host application
//!
//! ## Resilience Ports
//!
//! - `RateLimiter` - Sliding window limits per upstream host and webhook peer
//! - `CircuitBreaker` - Upstream provider resilience pattern

mod circuit_breaker;
mod event_store;
mod host_notifier;
mod host_resolver;
mod payment_gateway;
mod rate_limiter;
mod transaction_repository;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
pub use event_store::EventStore;
pub use host_notifier::{HostNotifier, TransactionNotification};
pub use host_resolver::HostResolver;
pub use payment_gateway::{
    ApiError, CreatePaymentRequest, CreatedPayment, PaymentAggregate, PaymentDetails,
    PaymentGateway, RegisterWebhookRequest, UserFlow, WebhookInfo,
};
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitScope,
    RateLimitStatus, RateLimiter,
};
pub use transaction_repository::TransactionRepository;

//! Rate limiter adapters.
//!
//! Implementations of the RateLimiter port.
//!
//! ## Usage
//!
//! ```ignore
//! use vipps_gateway::adapters::rate_limiter::{InMemoryRateLimiter, RateLimitConfig};
//!
//! let limiter = InMemoryRateLimiter::new(RateLimitConfig::default());
//! ```

mod config;
mod in_memory;

pub use config::{RateLimitConfig, WindowLimit};
pub use in_memory::InMemoryRateLimiter;

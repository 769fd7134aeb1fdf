//! Rate limit configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ports::RateLimitScope;

/// Complete rate limit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Outbound calls per upstream host.
    pub upstream: WindowLimit,
    /// Inbound webhook deliveries per peer address.
    pub webhook_peer: WindowLimit,
}

/// Maximum requests inside a sliding window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowLimit {
    pub requests: u32,
    pub window_secs: u32,
}

impl WindowLimit {
    pub fn new(requests: u32, window_secs: u32) -> Self {
        Self {
            requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(u64::from(self.window_secs))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            upstream: WindowLimit::new(100, 60),
            webhook_peer: WindowLimit::new(300, 60),
        }
    }
}

impl RateLimitConfig {
    /// Limit applying to a scope.
    pub fn limit_for(&self, scope: RateLimitScope) -> WindowLimit {
        match scope {
            RateLimitScope::UpstreamHost => self.upstream,
            RateLimitScope::WebhookPeer => self.webhook_peer,
        }
    }

    /// Longest window of any scope.
    pub fn longest_window(&self) -> Duration {
        self.upstream.window().max(self.webhook_peer.window())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_upstream_limit_is_100_per_minute() {
        let config = RateLimitConfig::default();
        assert_eq!(config.limit_for(RateLimitScope::UpstreamHost), WindowLimit::new(100, 60));
    }

    #[test]
    fn longest_window_spans_both_scopes() {
        let config = RateLimitConfig {
            upstream: WindowLimit::new(10, 60),
            webhook_peer: WindowLimit::new(10, 300),
        };
        assert_eq!(config.longest_window(), Duration::from_secs(300));
    }

    #[test]
    fn window_converts_to_duration() {
        assert_eq!(WindowLimit::new(1, 90).window(), Duration::from_secs(90));
    }
}

//! Host resolver adapters.
//!
//! - `SystemHostResolver` - Resolves through the OS resolver on every call
//! - `StaticHostResolver` - Fixed table, for tests and pinned deployments

use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::HostResolver;

/// Resolves via `tokio::net::lookup_host`. No caching beyond the OS's own.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHostResolver;

impl SystemHostResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl HostResolver for SystemHostResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        let addrs = tokio::net::lookup_host((host, 443)).await.map_err(|e| {
            DomainError::new(
                ErrorCode::InternalError,
                format!("DNS lookup for {} failed: {}", host, e),
            )
        })?;

        let mut ips: Vec<IpAddr> = addrs.map(|addr| addr.ip()).collect();
        ips.sort();
        ips.dedup();
        Ok(ips)
    }
}

/// Fixed host table. Unknown hosts resolve to nothing.
#[derive(Debug, Clone, Default)]
pub struct StaticHostResolver {
    entries: HashMap<String, Vec<IpAddr>>,
}

impl StaticHostResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>, ips: Vec<IpAddr>) -> Self {
        self.entries.insert(host.into().to_ascii_lowercase(), ips);
        self
    }
}

#[async_trait]
impl HostResolver for StaticHostResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, DomainError> {
        Ok(self
            .entries
            .get(&host.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_resolver_returns_configured_addresses() {
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let resolver = StaticHostResolver::new().with_host("Callback-1.Vipps.no", vec![ip]);

        assert_eq!(resolver.resolve("callback-1.vipps.no").await.unwrap(), vec![ip]);
        assert!(resolver.resolve("elsewhere.example").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn system_resolver_resolves_localhost() {
        let ips = SystemHostResolver::new().resolve("localhost").await.unwrap();
        assert!(ips.iter().any(|ip| ip.is_loopback()));
    }
}

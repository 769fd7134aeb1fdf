//! Host resolver port.
//!
//! Resolves provider callback hostnames at validation time. Results must
//! not be cached indefinitely because the provider rotates addresses.

use async_trait::async_trait;
use std::net::IpAddr;

use crate::domain::foundation::DomainError;

/// Port for DNS lookups.
#[async_trait]
pub trait HostResolver: Send + Sync {
    /// Returns every address `host` currently resolves to.
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, DomainError>;
}

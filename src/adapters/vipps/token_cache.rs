//! Access token cache.
//!
//! Read-mostly: callers share the cached token through an `RwLock`. Only
//! one refresh runs at a time; callers arriving during a refresh wait on the
//! refresh mutex and then pick up the new token instead of fetching again.

use std::future::Future;
use std::time::{Duration, Instant};

use secrecy::SecretString;
use tokio::sync::{Mutex, RwLock};

use crate::ports::ApiError;

/// Default margin before expiry at which a token is refreshed.
pub const DEFAULT_REFRESH_MARGIN: Duration = Duration::from_secs(300);

struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

/// Bearer token cache with single-flight refresh.
pub struct TokenCache {
    current: RwLock<Option<CachedToken>>,
    refresh: Mutex<()>,
    refresh_margin: Duration,
}

impl TokenCache {
    pub fn new(refresh_margin: Duration) -> Self {
        Self {
            current: RwLock::new(None),
            refresh: Mutex::new(()),
            refresh_margin,
        }
    }

    /// Returns the cached token, or runs `fetch` to obtain a new one.
    ///
    /// `fetch` resolves to the token and its lifetime. A failed fetch leaves
    /// the cache empty and is returned to every waiting caller in turn.
    pub async fn get_or_refresh<F, Fut>(&self, fetch: F) -> Result<SecretString, ApiError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(SecretString, Duration), ApiError>>,
    {
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let _refreshing = self.refresh.lock().await;

        // Another caller may have refreshed while we waited.
        if let Some(token) = self.valid_token().await {
            return Ok(token);
        }

        let (value, lifetime) = fetch().await?;
        // Short-lived tokens would otherwise never be considered fresh.
        let margin = self.refresh_margin.min(lifetime / 2);
        let refresh_at = Instant::now() + lifetime.saturating_sub(margin);

        *self.current.write().await = Some(CachedToken {
            value: value.clone(),
            refresh_at,
        });
        tracing::debug!(lifetime_secs = lifetime.as_secs(), "Access token refreshed");

        Ok(value)
    }

    /// Drops the cached token, e.g. after the API answered 401.
    pub async fn invalidate(&self) {
        *self.current.write().await = None;
    }

    async fn valid_token(&self) -> Option<SecretString> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|token| Instant::now() < token.refresh_at)
            .map(|token| token.value.clone())
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_MARGIN)
    }
}

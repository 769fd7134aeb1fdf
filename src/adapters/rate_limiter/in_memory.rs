//! In-memory sliding-window rate limiter.
//!
//! Each key keeps the instants of its requests inside the window. A request
//! is allowed while fewer than `requests` instants remain after pruning.
//! State is per process; each API client owns its own instance. Keys with
//! no request inside the longest window are swept on a later check.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::domain::foundation::Timestamp;
use crate::ports::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};

use super::config::RateLimitConfig;

/// In-memory rate limiter using a sliding log per key.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    /// Rate limit configuration.
    config: RateLimitConfig,
    windows: Mutex<Windows>,
}

#[derive(Debug)]
struct Windows {
    /// Request instants per storage key, oldest first.
    logs: HashMap<String, VecDeque<Instant>>,
    last_sweep: Instant,
}

impl Windows {
    /// Drops idle keys, at most once per `longest` window.
    fn sweep(&mut self, now: Instant, longest: Duration) {
        if now.duration_since(self.last_sweep) < longest {
            return;
        }
        self.logs.retain(|_, log| {
            log.back()
                .map_or(false, |newest| now.duration_since(*newest) < longest)
        });
        self.last_sweep = now;
    }
}

impl InMemoryRateLimiter {
    /// Create a new in-memory rate limiter.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: Mutex::new(Windows {
                logs: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    /// Create a rate limiter with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(RateLimitConfig::default())
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.windows.lock().map(|w| w.logs.len()).unwrap_or(0)
    }

    fn lock_windows(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, Windows>, RateLimitError> {
        self.windows
            .lock()
            .map_err(|_| RateLimitError::Unavailable("rate limiter lock poisoned".to_string()))
    }
}

fn prune(log: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = log.front() {
        if now.duration_since(*oldest) >= window {
            log.pop_front();
        } else {
            break;
        }
    }
}

/// Time until the oldest entry leaves the window.
fn time_to_free_slot(log: &VecDeque<Instant>, now: Instant, window: Duration) -> Duration {
    log.front()
        .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
        .unwrap_or(Duration::ZERO)
}

fn reset_at(wait: Duration) -> Timestamp {
    Timestamp::now().plus_secs(wait.as_secs() as i64)
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
        let limit = self.config.limit_for(key.scope);
        let window = limit.window();
        let now = Instant::now();

        let mut windows = self.lock_windows()?;
        windows.sweep(now, self.config.longest_window());
        let log = windows.logs.entry(key.to_storage_key()).or_default();
        prune(log, now, window);

        if log.len() as u32 >= limit.requests {
            let wait = time_to_free_slot(log, now, window);
            // Round up so callers never retry a fraction of a second early
            let retry_after = (wait.as_secs() + u64::from(wait.subsec_nanos() > 0)).max(1) as u32;

            return Ok(RateLimitResult::Denied(RateLimitDenied {
                limit: limit.requests,
                retry_after_secs: retry_after,
                scope: key.scope,
                message: format!(
                    "Rate limit exceeded for {} {}. Retry after {} seconds.",
                    key.scope, key.identifier, retry_after
                ),
            }));
        }

        log.push_back(now);
        let remaining = limit.requests.saturating_sub(log.len() as u32);
        let wait = time_to_free_slot(log, now, window);

        Ok(RateLimitResult::Allowed(RateLimitStatus {
            limit: limit.requests,
            remaining,
            reset_at: reset_at(wait),
            window_secs: limit.window_secs,
        }))
    }

    async fn status(&self, key: RateLimitKey) -> Result<RateLimitStatus, RateLimitError> {
        let limit = self.config.limit_for(key.scope);
        let window = limit.window();
        let now = Instant::now();

        let storage_key = key.to_storage_key();
        let mut windows = self.lock_windows()?;
        let (count, wait) = match windows.logs.get_mut(&storage_key) {
            Some(log) => {
                prune(log, now, window);
                (log.len() as u32, time_to_free_slot(log, now, window))
            }
            None => (0, Duration::ZERO),
        };
        if count == 0 {
            windows.logs.remove(&storage_key);
        }

        Ok(RateLimitStatus {
            limit: limit.requests,
            remaining: limit.requests.saturating_sub(count),
            reset_at: reset_at(wait),
            window_secs: limit.window_secs,
        })
    }

    async fn reset(&self, key: RateLimitKey) -> Result<(), RateLimitError> {
        let mut windows = self.lock_windows()?;
        windows.logs.remove(&key.to_storage_key());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::rate_limiter::WindowLimit;
    use crate::ports::RateLimitScope;

    fn limiter(requests: u32, window_secs: u32) -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(RateLimitConfig {
            upstream: WindowLimit::new(requests, window_secs),
            webhook_peer: WindowLimit::new(requests, window_secs),
        })
    }

    // ─── Basic Functionality Tests ───────────────────────────────────

    #[tokio::test]
    async fn allows_requests_within_limit() {
        let limiter = limiter(3, 60);
        let key = RateLimitKey::upstream_host("api.vipps.no");

        for expected_remaining in [2, 1, 0] {
            match limiter.check(key.clone()).await.unwrap() {
                RateLimitResult::Allowed(status) => {
                    assert_eq!(status.remaining, expected_remaining)
                }
                RateLimitResult::Denied(_) => panic!("should be allowed"),
            }
        }
    }

    #[tokio::test]
    async fn denies_requests_over_limit() {
        let limiter = limiter(2, 60);
        let key = RateLimitKey::upstream_host("api.vipps.no");

        assert!(limiter.check(key.clone()).await.unwrap().is_allowed());
        assert!(limiter.check(key.clone()).await.unwrap().is_allowed());

        match limiter.check(key).await.unwrap() {
            RateLimitResult::Denied(denied) => {
                assert_eq!(denied.limit, 2);
                assert_eq!(denied.scope, RateLimitScope::UpstreamHost);
                assert!(denied.retry_after_secs >= 1 && denied.retry_after_secs <= 60);
            }
            RateLimitResult::Allowed(_) => panic!("should be denied"),
        }
    }

    #[tokio::test]
    async fn denied_requests_are_not_recorded() {
        let limiter = limiter(1, 60);
        let key = RateLimitKey::upstream_host("api.vipps.no");

        limiter.check(key.clone()).await.unwrap();
        limiter.check(key.clone()).await.unwrap();
        limiter.check(key.clone()).await.unwrap();

        let status = limiter.status(key).await.unwrap();
        assert_eq!(status.remaining, 0);
        assert_eq!(status.limit, 1);
    }

    #[tokio::test]
    async fn hosts_are_limited_independently() {
        let limiter = limiter(1, 60);

        assert!(limiter
            .check(RateLimitKey::upstream_host("api.vipps.no"))
            .await
            .unwrap()
            .is_allowed());
        assert!(limiter
            .check(RateLimitKey::upstream_host("apitest.vipps.no"))
            .await
            .unwrap()
            .is_allowed());
        assert!(limiter
            .check(RateLimitKey::upstream_host("api.vipps.no"))
            .await
            .unwrap()
            .is_denied());
    }

    #[tokio::test]
    async fn window_slides_after_expiry() {
        let limiter = limiter(1, 1);
        let key = RateLimitKey::upstream_host("api.vipps.no");

        assert!(limiter.check(key.clone()).await.unwrap().is_allowed());
        assert!(limiter.check(key.clone()).await.unwrap().is_denied());

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(limiter.check(key).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn idle_peers_are_forgotten() {
        let limiter = limiter(5, 1);

        for peer in ["10.0.0.1", "10.0.0.2", "10.0.0.3"] {
            assert!(limiter
                .check(RateLimitKey::webhook_peer(peer))
                .await
                .unwrap()
                .is_allowed());
        }
        assert_eq!(limiter.tracked_keys(), 3);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        limiter
            .check(RateLimitKey::webhook_peer("10.0.0.4"))
            .await
            .unwrap();

        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test]
    async fn status_of_idle_key_leaves_nothing_behind() {
        let limiter = limiter(5, 60);

        let status = limiter
            .status(RateLimitKey::webhook_peer("10.0.0.9"))
            .await
            .unwrap();

        assert_eq!(status.remaining, 5);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[tokio::test]
    async fn reset_restores_quota() {
        let limiter = limiter(1, 60);
        let key = RateLimitKey::webhook_peer("10.0.0.1");

        limiter.check(key.clone()).await.unwrap();
        assert!(limiter.check(key.clone()).await.unwrap().is_denied());

        limiter.reset(key.clone()).await.unwrap();
        assert!(limiter.check(key).await.unwrap().is_allowed());
    }

    #[tokio::test]
    async fn status_does_not_consume_quota() {
        let limiter = limiter(5, 60);
        let key = RateLimitKey::upstream_host("api.vipps.no");

        for _ in 0..3 {
            let status = limiter.status(key.clone()).await.unwrap();
            assert_eq!(status.remaining, 5);
        }
    }
}

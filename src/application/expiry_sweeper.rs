//! ExpirySweeper - Background task expiring abandoned payments.
//!
//! Calls `ExpireStaleHandler` on a fixed interval until shutdown is
//! signalled. Hosts with their own scheduler can call the handler directly
//! instead.
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `interval` | 60s | Time between sweeps |
//!
//! ## Graceful Shutdown
//!
//! A sweep in progress finishes before the task exits. No final sweep is
//! run on shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::domain::foundation::Timestamp;

use super::handlers::payment::{ExpireStaleHandler, ExpireStaleResult};
use super::PaymentCommandError;

#[derive(Debug, Clone)]
pub struct ExpirySweeperConfig {
    pub interval: Duration,
}

impl Default for ExpirySweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl ExpirySweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

pub struct ExpirySweeper {
    handler: Arc<ExpireStaleHandler>,
    config: ExpirySweeperConfig,
}

impl ExpirySweeper {
    pub fn new(handler: Arc<ExpireStaleHandler>, config: ExpirySweeperConfig) -> Self {
        Self { handler, config }
    }

    /// Runs until `shutdown` carries `true` or its sender is dropped.
    ///
    /// Sweep failures are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!("Expiry sweeper stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    if let Err(e) = self.sweep_once().await {
                        tracing::warn!(error = %e, "Expiry sweep failed");
                    }
                }
            }
        }
    }

    /// Runs a single sweep at the current time.
    pub async fn sweep_once(&self) -> Result<ExpireStaleResult, PaymentCommandError> {
        let result = self.handler.handle(Timestamp::now()).await?;
        if !result.expired.is_empty() {
            tracing::info!(
                expired = result.expired.len(),
                skipped = result.skipped,
                "Expiry sweep completed"
            );
        }
        Ok(result)
    }
}

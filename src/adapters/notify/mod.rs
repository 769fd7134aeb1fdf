//! Host notifier adapters.
//!
//! - `TracingNotifier` - Logs notifications; the default when the host
//!   polls transaction state itself
//! - `ChannelNotifier` - Forwards notifications over a tokio channel to an
//!   in-process consumer

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{HostNotifier, TransactionNotification};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

#[async_trait]
impl HostNotifier for TracingNotifier {
    async fn notify(&self, notification: TransactionNotification) -> Result<(), DomainError> {
        tracing::info!(
            reference = %notification.reference,
            state = %notification.state,
            captured = notification.captured_amount,
            refunded = notification.refunded_amount,
            "Transaction state changed"
        );
        Ok(())
    }
}

/// Sends notifications into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<TransactionNotification>,
}

impl ChannelNotifier {
    /// Returns the notifier and the receiving end for the host.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransactionNotification>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl HostNotifier for ChannelNotifier {
    async fn notify(&self, notification: TransactionNotification) -> Result<(), DomainError> {
        self.sender.send(notification).await.map_err(|_| {
            DomainError::new(ErrorCode::NotificationError, "Notification receiver dropped")
        })
    }
}

//! Payment handlers.
//!
//! Command handlers for the transaction lifecycle:
//!
//! ## Commands
//! - Creating a payment with its per-transaction webhook
//! - Capturing, refunding and cancelling
//! - Processing provider webhooks
//! - Reconciling with the provider by polling
//! - Expiring stale transactions
//!
//! Every handler that mutates an existing transaction holds its
//! `TransactionLocks` entry from load to the end of side effects.

mod cancel_payment;
mod capture_payment;
mod create_payment;
mod expire_stale;
mod handle_webhook;
mod refund_payment;
mod side_effects;
mod sync_payment;

// Commands
pub use cancel_payment::{CancelPaymentCommand, CancelPaymentHandler, CancelPaymentResult};
pub use capture_payment::{CapturePaymentCommand, CapturePaymentHandler, CapturePaymentResult};
pub use create_payment::{
    CreatePaymentCommand, CreatePaymentConfig, CreatePaymentHandler, CreatePaymentResult,
    DEFAULT_EXPIRY_MINUTES,
};
pub use expire_stale::{ExpireStaleHandler, ExpireStaleResult, DEFAULT_BATCH_SIZE};
pub use handle_webhook::{HandleWebhookHandler, WebhookDisposition};
pub use refund_payment::{RefundPaymentCommand, RefundPaymentHandler, RefundPaymentResult};
pub use sync_payment::{SyncPaymentCommand, SyncPaymentHandler, SyncPaymentResult};

// Shared
pub use side_effects::SideEffectRunner;

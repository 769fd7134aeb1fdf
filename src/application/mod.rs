//! Application layer - Command handlers and the services they share.
//!
//! Orchestrates the domain through ports. Nothing here knows about HTTP
//! routing or a concrete database.
//!
//! - `handlers` - one handler per payment command
//! - `webhook_validator` - authentication and deduplication of deliveries
//! - `transaction_locks` - per-reference serialization
//! - `expiry_sweeper` - periodic expiry of abandoned payments

mod errors;
mod expiry_sweeper;
pub mod handlers;
mod transaction_locks;
mod webhook_validator;

pub use errors::PaymentCommandError;
pub use expiry_sweeper::{ExpirySweeper, ExpirySweeperConfig};
pub use handlers::payment::{
    CancelPaymentCommand, CancelPaymentHandler, CancelPaymentResult, CapturePaymentCommand,
    CapturePaymentHandler, CapturePaymentResult, CreatePaymentCommand, CreatePaymentConfig,
    CreatePaymentHandler, CreatePaymentResult, ExpireStaleHandler, ExpireStaleResult,
    HandleWebhookHandler, RefundPaymentCommand, RefundPaymentHandler, RefundPaymentResult,
    SideEffectRunner, SyncPaymentCommand, SyncPaymentHandler, SyncPaymentResult,
    WebhookDisposition,
};
pub use transaction_locks::TransactionLocks;
pub use webhook_validator::{
    ValidatedWebhook, WebhookRequest, WebhookValidator, WebhookValidatorConfig,
};

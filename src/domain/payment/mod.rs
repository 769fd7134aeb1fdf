//! Payment domain module.
//!
//! Authoritative lifecycle model for one payment attempt.
//!
//! # Module Structure
//!
//! - `state` - TransactionState state machine
//! - `event_name` - provider event name lookup table
//! - `event` - PaymentEvent input to the aggregate
//! - `transaction` - Transaction aggregate, side effects and outcomes
//! - `errors` - PaymentError

mod errors;
mod event;
mod event_name;
mod state;
mod transaction;

pub use errors::PaymentError;
pub use event::PaymentEvent;
pub use event_name::{PaymentEventKind, PaymentEventName};
pub use state::TransactionState;
pub use transaction::{
    ApplyOutcome, CapturePolicy, SideEffect, Transaction, TransactionParts, WebhookSubscription,
};

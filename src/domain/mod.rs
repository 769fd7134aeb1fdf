//! Domain layer containing business logic and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (value objects, IDs, errors)
//! - `payment` - Transaction aggregate and its state machine
//! - `webhook` - Webhook payloads, signatures and source checks

pub mod foundation;
pub mod payment;
pub mod webhook;

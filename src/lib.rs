//! Vipps Gateway - Vipps/MobilePay ePayment integration core
//!
//! Tracks every payment through its lifecycle, verifies and applies the
//! provider's webhook deliveries, and calls the ePayment API through a
//! rate-limited, retrying, circuit-broken client.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

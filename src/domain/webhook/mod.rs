//! Webhook domain module.
//!
//! Pure checks for inbound provider notifications. The validation pipeline
//! that needs storage and DNS lives in `application::webhook_validator`.
//!
//! # Module Structure
//!
//! - `payload` - body parsing and dedup key
//! - `headers` - header extraction and authorization parsing
//! - `signature` - content hash, freshness and HMAC verification
//! - `source` - provider environments and callback hosts
//! - `record` - event store record
//! - `errors` - WebhookRejection with HTTP status mapping

mod errors;
mod headers;
mod payload;
mod record;
pub mod signature;
mod source;

pub use errors::WebhookRejection;
pub use headers::{AuthorizationHeader, WebhookHeaderNames, WebhookHeaders, SIGNATURE_ALGORITHM};
pub use payload::WebhookPayload;
pub use record::{InsertOutcome, WebhookEventRecord};
pub use signature::{WebhookSigner, DEFAULT_TOLERANCE_SECS};
pub use source::ProviderEnvironment;

//! Mapping of provider event names to target transaction states.
//!
//! The provider sends names like `epayments.payment.authorized.v1`, and the
//! polling API reports bare states like `AUTHORIZED`. Both resolve through
//! the same lookup table. Anything not in the table is `Unknown` and is
//! never guessed.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::TransactionState;

const EVENT_PREFIX: &str = "epayments.payment.";
const EVENT_VERSION_SUFFIX: &str = ".v1";

/// Known payment event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    Created,
    Authorized,
    Captured,
    Refunded,
    Cancelled,
    /// Customer aborted in the app.
    Aborted,
    Expired,
    Terminated,
}

/// `(short name, kind, target state)`
const EVENT_TABLE: [(&str, PaymentEventKind, TransactionState); 8] = [
    ("created", PaymentEventKind::Created, TransactionState::Created),
    ("authorized", PaymentEventKind::Authorized, TransactionState::Authorized),
    ("captured", PaymentEventKind::Captured, TransactionState::Captured),
    ("refunded", PaymentEventKind::Refunded, TransactionState::Refunded),
    ("cancelled", PaymentEventKind::Cancelled, TransactionState::Cancelled),
    ("aborted", PaymentEventKind::Aborted, TransactionState::Cancelled),
    ("expired", PaymentEventKind::Expired, TransactionState::Expired),
    ("terminated", PaymentEventKind::Terminated, TransactionState::Terminated),
];

impl PaymentEventKind {
    /// Short lower-case name used inside the full event name.
    pub fn short_name(&self) -> &'static str {
        EVENT_TABLE
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(name, _, _)| *name)
            .unwrap_or("unknown")
    }

    /// State the transaction moves to when this event is applied.
    ///
    /// `Refunded` targets `REFUNDED`, but a partial refund keeps the
    /// transaction in `CAPTURED`; the aggregate decides.
    pub fn target_state(&self) -> TransactionState {
        EVENT_TABLE
            .iter()
            .find(|(_, kind, _)| kind == self)
            .map(|(_, _, state)| *state)
            .unwrap_or(TransactionState::Created)
    }

    /// Full versioned webhook event name.
    pub fn webhook_name(&self) -> String {
        format!("{}{}{}", EVENT_PREFIX, self.short_name(), EVENT_VERSION_SUFFIX)
    }

    /// All kinds, in lifecycle order.
    pub fn all() -> impl Iterator<Item = PaymentEventKind> {
        EVENT_TABLE.iter().map(|(_, kind, _)| *kind)
    }
}

/// A provider event name: either a known kind or an unmapped raw name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PaymentEventName {
    Known(PaymentEventKind),
    Unknown(String),
}

impl PaymentEventName {
    /// Resolves a raw event or state name.
    ///
    /// Accepts `epayments.payment.<x>.v1` and bare `<x>`, case-insensitive.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        let short = lowered
            .strip_prefix(EVENT_PREFIX)
            .and_then(|rest| rest.strip_suffix(EVENT_VERSION_SUFFIX))
            .unwrap_or(&lowered);

        EVENT_TABLE
            .iter()
            .find(|(name, _, _)| *name == short)
            .map(|(_, kind, _)| PaymentEventName::Known(*kind))
            .unwrap_or_else(|| PaymentEventName::Unknown(raw.to_string()))
    }

    /// Returns the known kind, if any.
    pub fn kind(&self) -> Option<PaymentEventKind> {
        match self {
            PaymentEventName::Known(kind) => Some(*kind),
            PaymentEventName::Unknown(_) => None,
        }
    }

    /// Target state, `None` for unknown events.
    pub fn target_state(&self) -> Option<TransactionState> {
        self.kind().map(|kind| kind.target_state())
    }
}

impl From<PaymentEventKind> for PaymentEventName {
    fn from(kind: PaymentEventKind) -> Self {
        PaymentEventName::Known(kind)
    }
}

impl fmt::Display for PaymentEventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentEventName::Known(kind) => write!(f, "{}", kind.webhook_name()),
            PaymentEventName::Unknown(raw) => write!(f, "{}", raw),
        }
    }
}

//! Transaction lifecycle state machine.
//!
//! ```text
//! CREATED    -> AUTHORIZED | CANCELLED | EXPIRED
//! AUTHORIZED -> CAPTURED | CANCELLED | TERMINATED
//! CAPTURED   -> REFUNDED | TERMINATED
//! REFUNDED, CANCELLED, EXPIRED, TERMINATED: terminal
//! ```

use crate::domain::foundation::StateMachine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle stage of one payment attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionState {
    /// Persisted locally, provider not yet confirmed authorization.
    Created,

    /// Funds reserved on the customer's account.
    Authorized,

    /// Some or all of the reserved amount has been captured.
    /// Partial refunds stay here.
    Captured,

    /// Captured amount fully refunded.
    Refunded,

    /// Cancelled by merchant or aborted by the customer.
    Cancelled,

    /// Never authorized before its deadline.
    Expired,

    /// Terminated by the provider.
    Terminated,
}

impl TransactionState {
    pub const ALL: [TransactionState; 7] = [
        TransactionState::Created,
        TransactionState::Authorized,
        TransactionState::Captured,
        TransactionState::Refunded,
        TransactionState::Cancelled,
        TransactionState::Expired,
        TransactionState::Terminated,
    ];

    /// Storage and wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionState::Created => "CREATED",
            TransactionState::Authorized => "AUTHORIZED",
            TransactionState::Captured => "CAPTURED",
            TransactionState::Refunded => "REFUNDED",
            TransactionState::Cancelled => "CANCELLED",
            TransactionState::Expired => "EXPIRED",
            TransactionState::Terminated => "TERMINATED",
        }
    }

    /// Returns true if the host should hear about reaching this state.
    ///
    /// Terminal states plus `AUTHORIZED`, where the host decides on capture.
    pub fn is_notifiable(&self) -> bool {
        self.is_terminal() || *self == TransactionState::Authorized
    }
}

impl StateMachine for TransactionState {
    fn can_transition_to(&self, target: &Self) -> bool {
        use TransactionState::*;
        matches!(
            (self, target),
            // From CREATED
            (Created, Authorized)
                | (Created, Cancelled)
                | (Created, Expired)
            // From AUTHORIZED
                | (Authorized, Captured)
                | (Authorized, Cancelled)
                | (Authorized, Terminated)
            // From CAPTURED
                | (Captured, Refunded)
                | (Captured, Terminated)
        )
    }

    fn valid_transitions(&self) -> Vec<Self> {
        use TransactionState::*;
        match self {
            Created => vec![Authorized, Cancelled, Expired],
            Authorized => vec![Captured, Cancelled, Terminated],
            Captured => vec![Refunded, Terminated],
            Refunded | Cancelled | Expired | Terminated => vec![],
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransactionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TransactionState::ALL
            .iter()
            .copied()
            .find(|state| state.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown transaction state '{}'", s))
    }
}

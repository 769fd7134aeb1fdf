//! Payment events consumed by the transaction aggregate.

use crate::domain::foundation::Currency;

use super::{PaymentEventKind, PaymentEventName};

/// One event to apply to a transaction, from a webhook or from polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    pub name: PaymentEventName,

    /// Amount in minor units. For `captured`/`refunded` this is compared
    /// against the running total, never added to it.
    pub amount: Option<i64>,

    pub currency: Option<Currency>,

    /// Provider-assigned PSP reference, if the event carries one.
    pub psp_reference: Option<String>,

    /// `false` when the provider reports the operation failed.
    pub success: bool,
}

impl PaymentEvent {
    /// Creates a successful event without amount information.
    pub fn new(name: impl Into<PaymentEventName>) -> Self {
        Self {
            name: name.into(),
            amount: None,
            currency: None,
            psp_reference: None,
            success: true,
        }
    }

    pub fn with_amount(mut self, value: i64, currency: Currency) -> Self {
        self.amount = Some(value);
        self.currency = Some(currency);
        self
    }

    pub fn with_psp_reference(mut self, psp_reference: impl Into<String>) -> Self {
        self.psp_reference = Some(psp_reference.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = success;
        self
    }

    /// Known kind of this event, if any.
    pub fn kind(&self) -> Option<PaymentEventKind> {
        self.name.kind()
    }
}

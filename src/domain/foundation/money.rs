//! Monetary value objects.
//!
//! Amounts are always integer minor units (øre, cents). Floats never appear.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::ValidationError;

/// ISO 4217 currency code (three upper-case ASCII letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Creates a validated currency code.
    pub fn new(code: impl Into<String>) -> Result<Self, ValidationError> {
        let code = code.into();
        if code.is_empty() {
            return Err(ValidationError::empty_field("currency"));
        }
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ValidationError::invalid_format(
                "currency",
                format!("'{}' is not an ISO 4217 code", code),
            ));
        }
        Ok(Self(code))
    }

    /// Norwegian krone.
    pub fn nok() -> Self {
        Self("NOK".to_string())
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.0
    }
}

/// An amount in minor units together with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub value: i64,
    pub currency: Currency,
}

impl Money {
    /// Creates a strictly positive amount.
    pub fn new(value: i64, currency: Currency) -> Result<Self, ValidationError> {
        if value <= 0 {
            return Err(ValidationError::out_of_range("amount", 1, i64::MAX, value));
        }
        Ok(Self { value, currency })
    }

    /// Returns true if both amounts are in the same currency.
    pub fn same_currency(&self, other: &Currency) -> bool {
        &self.currency == other
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

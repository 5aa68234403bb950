//! Monetary amounts as returned by the remote API.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Monetary amount with currency code.
///
/// The amount is kept as the decimal string the API sends (preserves
/// precision); this type is for display and transport, not arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Money {
    /// Decimal amount as string (e.g., "19.99").
    pub amount: String,
    /// ISO 4217 currency code (e.g., "USD").
    pub currency_code: String,
}

impl Money {
    /// Create a new amount.
    #[must_use]
    pub fn new(amount: impl Into<String>, currency_code: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            currency_code: currency_code.into(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount, self.currency_code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let money = Money::new("19.99", "USD");
        assert_eq!(money.to_string(), "19.99 USD");
    }

    #[test]
    fn test_serde_camel_case() {
        let money: Money =
            serde_json::from_str(r#"{"amount":"5.00","currencyCode":"EUR"}"#).unwrap();
        assert_eq!(money, Money::new("5.00", "EUR"));
    }
}

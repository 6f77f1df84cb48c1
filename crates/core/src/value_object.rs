//! Value objects: equality by value, not identity.

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};

/// Marker trait for value objects.
///
/// Value objects are immutable and compared by their attribute values. Two
/// `Money` values with the same amount and currency are the same money.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}

/// ISO-4217-like currency code (three upper-case ASCII letters).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Currencies the ledger accepts when opening accounts.
    pub const SUPPORTED: [&'static str; 3] = ["USD", "EUR", "INR"];

    pub fn new(code: impl Into<String>) -> LedgerResult<Self> {
        let code = code.into();
        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(LedgerError::validation(format!(
                "currency code must be three upper-case letters, got '{code}'"
            )));
        }
        Ok(Self(code))
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_supported(&self) -> bool {
        Self::SUPPORTED.contains(&self.0.as_str())
    }
}

impl ValueObject for Currency {}

impl core::fmt::Display for Currency {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Currency {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

/// An amount in minor units (cents) tagged with its currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: i64,
    pub currency: Currency,
}

impl ValueObject for Money {}

impl Money {
    pub fn new(amount: i64, currency: Currency) -> Self {
        Self { amount, currency }
    }

    /// Add two amounts of the same currency.
    pub fn checked_add(&self, other: &Money) -> LedgerResult<Money> {
        if self.currency != other.currency {
            return Err(LedgerError::validation(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )));
        }
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| LedgerError::validation("amount overflow"))?;
        Ok(Money::new(amount, self.currency.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn currency_validation() {
        assert!(Currency::new("USD").unwrap().is_supported());
        assert!(!Currency::new("GBP").unwrap().is_supported());
        assert!(Currency::new("usd").is_err());
        assert!(Currency::new("DOLLAR").is_err());
    }

    #[test]
    fn money_adds_only_same_currency() {
        let usd = Money::new(100, Currency::usd());
        let more = Money::new(250, Currency::usd());
        assert_eq!(usd.checked_add(&more).unwrap().amount, 350);

        let eur = Money::new(1, Currency::new("EUR").unwrap());
        assert!(usd.checked_add(&eur).is_err());
    }

    #[test]
    fn currency_serde_is_a_plain_string() {
        let json = serde_json::to_string(&Currency::usd()).unwrap();
        assert_eq!(json, "\"USD\"");
        assert!(serde_json::from_str::<Currency>("\"usd\"").is_err());
    }
}

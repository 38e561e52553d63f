//! Type-safe price representation using decimal arithmetic.
//!
//! The marketplace sells in several local currencies (airtime bundles are
//! priced in the operator's currency), so currency codes are validated
//! ISO 4217-shaped strings rather than a closed enum.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`CurrencyCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyCodeError {
    /// The code is not exactly three characters long.
    #[error("currency code must be 3 letters (got {0:?})")]
    InvalidLength(String),
    /// The code contains something other than ASCII letters.
    #[error("currency code must be alphabetic (got {0:?})")]
    NonAlphabetic(String),
}

/// ISO 4217 currency code, normalized to upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parse a currency code, accepting any letter case.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not three ASCII letters.
    pub fn parse(s: &str) -> Result<Self, CurrencyCodeError> {
        let trimmed = s.trim();
        if trimmed.len() != 3 {
            return Err(CurrencyCodeError::InvalidLength(s.to_owned()));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(CurrencyCodeError::NonAlphabetic(s.to_owned()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CurrencyCode {
    fn default() -> Self {
        Self("USD".to_owned())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = CurrencyCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = CurrencyCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A price with currency information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Price of `quantity` units at this unit price.
    #[must_use]
    pub fn times(&self, quantity: u32) -> Self {
        Self {
            amount: self.amount * Decimal::from(quantity),
            currency_code: self.currency_code.clone(),
        }
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency_code)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code_normalizes_case() {
        let code = CurrencyCode::parse("ngn").unwrap();
        assert_eq!(code.as_str(), "NGN");
    }

    #[test]
    fn test_currency_code_rejects_bad_input() {
        assert!(matches!(
            CurrencyCode::parse("US"),
            Err(CurrencyCodeError::InvalidLength(_))
        ));
        assert!(matches!(
            CurrencyCode::parse("U5D"),
            Err(CurrencyCodeError::NonAlphabetic(_))
        ));
    }

    #[test]
    fn test_currency_code_deserialize_validates() {
        let ok: Result<CurrencyCode, _> = serde_json::from_str("\"kes\"");
        assert_eq!(ok.unwrap().as_str(), "KES");

        let bad: Result<CurrencyCode, _> = serde_json::from_str("\"dollars\"");
        assert!(bad.is_err());
    }

    #[test]
    fn test_price_times_and_display() {
        let price = Price::new(Decimal::new(1250, 2), CurrencyCode::default());
        let line = price.times(3);
        assert_eq!(line.amount, Decimal::new(3750, 2));
        assert_eq!(line.to_string(), "37.50 USD");
    }
}

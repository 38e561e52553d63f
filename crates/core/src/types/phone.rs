//! Phone number type.
//!
//! Accounts on the recharge storefront are keyed by mobile number, so the
//! signed-in user carries one of these rather than an email address.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`PhoneNumber`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PhoneNumberError {
    /// The input string is empty.
    #[error("phone number cannot be empty")]
    Empty,
    /// The input contains characters other than digits, separators and a leading `+`.
    #[error("phone number contains invalid character {0:?}")]
    InvalidCharacter(char),
    /// The number of digits is outside the E.164 range.
    #[error("phone number must have between {min} and {max} digits (got {actual})")]
    InvalidLength {
        /// Minimum digit count.
        min: usize,
        /// Maximum digit count.
        max: usize,
        /// Digits found.
        actual: usize,
    },
}

/// A mobile phone number normalized to E.164 digits (with leading `+`).
///
/// ## Constraints
///
/// - Spaces, dashes, dots and parentheses are stripped
/// - An optional single leading `+` is allowed
/// - 7-15 digits remain after normalization
///
/// ## Examples
///
/// ```
/// use cartsync_core::PhoneNumber;
///
/// let phone = PhoneNumber::parse("+234 803-555-0100").unwrap();
/// assert_eq!(phone.as_str(), "+2348035550100");
///
/// assert!(PhoneNumber::parse("").is_err());
/// assert!(PhoneNumber::parse("call me").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Minimum digit count accepted.
    pub const MIN_DIGITS: usize = 7;
    /// Maximum digit count (E.164).
    pub const MAX_DIGITS: usize = 15;

    /// Parse and normalize a phone number.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, contains letters or other
    /// symbols, or has too few or too many digits.
    pub fn parse(s: &str) -> Result<Self, PhoneNumberError> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PhoneNumberError::Empty);
        }

        let mut digits = String::with_capacity(trimmed.len());
        for (i, c) in trimmed.chars().enumerate() {
            match c {
                '0'..='9' => digits.push(c),
                '+' if i == 0 => {}
                ' ' | '-' | '.' | '(' | ')' => {}
                other => return Err(PhoneNumberError::InvalidCharacter(other)),
            }
        }

        if !(Self::MIN_DIGITS..=Self::MAX_DIGITS).contains(&digits.len()) {
            return Err(PhoneNumberError::InvalidLength {
                min: Self::MIN_DIGITS,
                max: Self::MAX_DIGITS,
                actual: digits.len(),
            });
        }

        Ok(Self(format!("+{digits}")))
    }

    /// Returns the normalized number as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the number with all but the last four digits masked.
    #[must_use]
    pub fn masked(&self) -> String {
        let digits = self.0.strip_prefix('+').unwrap_or(&self.0);
        let hidden = digits.len().saturating_sub(4);
        format!("+{}{}", "*".repeat(hidden), digits.get(hidden..).unwrap_or_default())
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneNumberError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

impl std::str::FromStr for PhoneNumber {
    type Err = PhoneNumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

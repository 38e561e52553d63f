//! Core types for cartsync.
//!
//! This module provides type-safe wrappers for the cart domain.

pub mod cart;
pub mod id;
pub mod phone;
pub mod price;

pub use cart::{CartLine, CartSnapshot, LineInput, LineOutcome};
pub use id::*;
pub use phone::{PhoneNumber, PhoneNumberError};
pub use price::{CurrencyCode, CurrencyCodeError, Price};

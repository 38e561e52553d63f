//! cartsync core - shared types library.
//!
//! This crate provides the domain types used across the cartsync components:
//! - `client` - cart synchronization store, auth token store and REST client
//! - `cli` - command-line driver for the store
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access,
//! no HTTP clients. Cart arithmetic (totals, clamping) lives here so it can be
//! tested without a runtime.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, prices, phone numbers, and cart snapshots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

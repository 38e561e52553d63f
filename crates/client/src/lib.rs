//! cartsync client library.
//!
//! Keeps a shopping cart consistent between a locally persisted guest cart
//! and the server-authoritative cart of a signed-in user.
//!
//! # Modules
//!
//! - [`storage`] - key/value persistence (memory and file backends)
//! - [`auth`] - access/refresh token store with change notifications
//! - [`api`] - REST client for the cart endpoints, with single-flight token refresh
//! - [`cart`] - the cart store and its sync state machine
//! - [`config`] - environment-driven configuration

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod api;
pub mod auth;
pub mod cart;
pub mod config;
pub mod storage;

pub use api::{ApiError, CartApi, HttpCartApi, MockCartApi};
pub use auth::{AuthSession, AuthStore, AuthUser};
pub use cart::{CartError, CartStore, SyncPhase, SyncState};
pub use config::{ApiConfig, ClientConfig, ConfigError};
pub use storage::{FileStore, KeyValueStore, MemoryStore, SharedStore, StorageError};

//! Command implementations.
//!
//! Every command opens the same [`Session`]: a file-backed storage directory,
//! the auth store restored from it, and a cart store talking to the REST API.

pub mod cart;
pub mod session;

use std::sync::Arc;

use cartsync_client::{
    ApiError, AuthStore, CartError, CartStore, ClientConfig, ConfigError, FileStore, HttpCartApi,
    SharedStore, StorageError,
};
use cartsync_core::{CurrencyCodeError, PhoneNumberError};
use thiserror::Error;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("API client error: {0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Cart(#[from] CartError),

    #[error("Invalid phone number: {0}")]
    Phone(#[from] PhoneNumberError),

    #[error("Invalid currency: {0}")]
    Currency(#[from] CurrencyCodeError),

    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    /// The server cart could not be fetched (details are in the log).
    #[error("Cart sync failed")]
    SyncFailed,
}

/// Stores shared by all commands.
pub struct Session {
    pub auth: AuthStore,
    pub store: CartStore,
}

impl Session {
    /// Open the storage directory and restore auth and cart state from it.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be opened or read, or the HTTP
    /// client cannot be built.
    pub fn open(config: &ClientConfig) -> Result<Self, CliError> {
        let storage: SharedStore = Arc::new(FileStore::open(&config.storage_dir)?);
        let auth = AuthStore::restore(Arc::clone(&storage))?;
        let api = HttpCartApi::new(&config.api, auth.clone())?;
        let store = CartStore::restore(Arc::new(api), auth.clone(), storage)?;

        tracing::debug!(
            storage_dir = %config.storage_dir.display(),
            authenticated = auth.is_authenticated(),
            "Session opened"
        );
        Ok(Self { auth, store })
    }
}

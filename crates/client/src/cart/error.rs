//! Cart store errors.

use thiserror::Error;

use crate::api::ApiError;
use crate::storage::StorageError;

/// Errors returned by [`super::CartStore`] operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The server call failed. Local state is unchanged.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// Persisted state could not be read or purged.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Quantities passed to `add_item` must be at least 1.
    #[error("quantity must be at least 1, got {0}")]
    InvalidQuantity(u32),

    /// The user signed in or out while the request was outstanding; its
    /// response was discarded.
    #[error("session changed while the request was in flight")]
    SessionChanged,
}

impl CartError {
    /// Returns `true` if the caller should prompt for re-authentication.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        match self {
            Self::Api(e) => e.is_session_expired(),
            _ => false,
        }
    }
}

/// Result type for cart operations.
pub type Result<T> = std::result::Result<T, CartError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_expired_classification() {
        assert!(CartError::Api(ApiError::SessionExpired("x".into())).is_session_expired());
        assert!(!CartError::SessionChanged.is_session_expired());
        assert!(!CartError::InvalidQuantity(0).is_session_expired());
    }

    #[test]
    fn test_display_is_transparent() {
        let err = CartError::from(ApiError::NotFound("cart item srv-1".into()));
        assert_eq!(err.to_string(), "Not found: cart item srv-1");
    }
}

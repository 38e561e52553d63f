//! Remote Cart API.
//!
//! # Architecture
//!
//! - [`CartApi`] is the seam the cart store depends on; every mutation
//!   returns the server's full cart, which the store applies wholesale
//! - [`HttpCartApi`] talks to the storefront REST API with a bearer token
//! - A 401 triggers one token refresh (shared by all concurrent callers via
//!   [`RefreshGate`]) and a single retry
//! - [`MockCartApi`] is an in-memory server for tests and offline runs
//!
//! # Endpoints
//!
//! | Method | Path | Body |
//! |---|---|---|
//! | `GET` | `/cart` | |
//! | `POST` | `/cart/items` | `{productId, qty}` |
//! | `PATCH` | `/cart/items/{itemId}` | `{qty}` |
//! | `DELETE` | `/cart/items/{itemId}` | |
//! | `POST` | `/cart/clear` | |
//! | `POST` | `/auth/refresh` | `{refreshToken}` |

mod http;
mod mock;
mod refresh;

pub use http::HttpCartApi;
pub use mock::MockCartApi;
pub use refresh::{RefreshError, RefreshFuture, RefreshGate, RefreshResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cartsync_core::{CartSnapshot, LineItemId, ProductId};

/// Errors that can occur when calling the cart API.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request could not complete (connect, timeout, body read).
    #[error("HTTP error: {0}")]
    Network(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("API returned {status}: {message}")]
    Status { status: u16, message: String },

    /// The referenced cart line or product does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A 401 survived the refresh attempt, or the refresh token was rejected.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// The token needed refreshing but the refresh endpoint could not be
    /// reached. The session is kept; a later request tries again.
    #[error("Token refresh unavailable: {0}")]
    RefreshUnavailable(String),

    /// No access token is held.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Response body was not the expected JSON.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Returns `true` if the caller should prompt for re-authentication.
    #[must_use]
    pub const fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired(_) | Self::NotAuthenticated)
    }

    /// Returns `true` for failures that say nothing about the request
    /// itself and may succeed on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RefreshUnavailable(_))
    }

    /// Returns `true` for a 404 from the server.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Server-side cart operations for the authenticated caller.
///
/// Every method returns the resulting full cart.
#[async_trait]
pub trait CartApi: Send + Sync {
    /// Fetch the current cart.
    async fn get_cart(&self) -> Result<CartSnapshot, ApiError>;

    /// Add `qty` units of a product (the server merges into an existing line).
    async fn add_item(&self, product_id: &ProductId, qty: u32) -> Result<CartSnapshot, ApiError>;

    /// Set a line's quantity.
    async fn update_item(&self, item_id: &LineItemId, qty: u32)
    -> Result<CartSnapshot, ApiError>;

    /// Remove a line.
    async fn remove_item(&self, item_id: &LineItemId) -> Result<CartSnapshot, ApiError>;

    /// Remove every line.
    async fn clear_cart(&self) -> Result<CartSnapshot, ApiError>;
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddItemRequest<'a> {
    pub product_id: &'a ProductId,
    pub qty: u32,
}

#[derive(Debug, Serialize)]
pub(crate) struct UpdateItemRequest {
    pub qty: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Error body shape used by the API (`{"message": "..."}`).
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default, alias = "error")]
    pub message: Option<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Status {
            status: 503,
            message: "maintenance".to_string(),
        };
        assert_eq!(err.to_string(), "API returned 503: maintenance");

        let err = ApiError::SessionExpired("refresh rejected".to_string());
        assert_eq!(err.to_string(), "Session expired: refresh rejected");
    }

    #[test]
    fn test_api_error_classification() {
        assert!(ApiError::NotAuthenticated.is_session_expired());
        assert!(ApiError::SessionExpired(String::new()).is_session_expired());
        assert!(!ApiError::NotFound("x".into()).is_session_expired());
        assert!(ApiError::NotFound("x".into()).is_not_found());

        let unavailable = ApiError::RefreshUnavailable("HTTP 503".into());
        assert!(unavailable.is_transient());
        assert!(!unavailable.is_session_expired());
        assert!(!ApiError::NotFound("x".into()).is_transient());
    }

    #[test]
    fn test_add_item_request_shape() {
        let product_id = ProductId::new("p1");
        let body = serde_json::to_value(AddItemRequest {
            product_id: &product_id,
            qty: 2,
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({"productId": "p1", "qty": 2}));
    }

    #[test]
    fn test_refresh_response_optional_fields() {
        let resp: RefreshResponse = serde_json::from_str(r#"{"token":"t"}"#).unwrap();
        assert_eq!(resp.token, "t");
        assert!(resp.refresh_token.is_none());
        assert!(resp.expires_in.is_none());
    }

    #[test]
    fn test_error_body_accepts_error_alias() {
        let body: ErrorBody = serde_json::from_str(r#"{"error":"out of stock"}"#).unwrap();
        assert_eq!(body.message.as_deref(), Some("out of stock"));
    }
}

//! HTTP implementation of [`CartApi`].
//!
//! Uses `reqwest` with JSON bodies. Every cart call carries the current
//! access token; a 401 is recovered once through the shared refresh gate.

use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use cartsync_core::{CartSnapshot, LineItemId, ProductId};

use super::refresh::{RefreshError, RefreshGate, RefreshResult};
use super::{
    AddItemRequest, ApiError, CartApi, ErrorBody, RefreshRequest, RefreshResponse,
    UpdateItemRequest,
};
use crate::auth::AuthStore;
use crate::config::ApiConfig;

/// Maximum number of response body characters copied into errors and logs.
const BODY_PREVIEW_CHARS: usize = 200;

/// Client for the storefront cart REST API.
///
/// Cheaply cloneable via `Arc`; clones share the HTTP connection pool and
/// the refresh gate.
#[derive(Clone)]
pub struct HttpCartApi {
    inner: Arc<HttpCartApiInner>,
}

struct HttpCartApiInner {
    client: reqwest::Client,
    base_url: Url,
    auth: AuthStore,
    refresh: RefreshGate,
    refresher: TokenRefresher,
}

/// What a refresh attempt needs. Kept apart from [`HttpCartApiInner`] so the
/// shared attempt does not own the gate it is stored in.
#[derive(Clone)]
struct TokenRefresher {
    client: reqwest::Client,
    refresh_url: Url,
    auth: AuthStore,
}

impl HttpCartApi {
    /// Create a new API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the refresh URL cannot be built or the HTTP
    /// client cannot be initialized.
    pub fn new(config: &ApiConfig, auth: AuthStore) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("cartsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let base_url = config.base_url.clone();
        let refresh_url = join(&base_url, &config.refresh_path)?;

        Ok(Self {
            inner: Arc::new(HttpCartApiInner {
                refresher: TokenRefresher {
                    client: client.clone(),
                    refresh_url,
                    auth: auth.clone(),
                },
                client,
                base_url,
                auth,
                refresh: RefreshGate::new(),
            }),
        })
    }

    /// The refresh gate shared by this client's requests.
    #[must_use]
    pub fn refresh_gate(&self) -> &RefreshGate {
        &self.inner.refresh
    }

    /// Send an authenticated request and decode the JSON response.
    async fn send<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        let url = join(&self.inner.base_url, path)?;
        let mut token = self.current_token().await?;
        let mut retried = false;

        loop {
            let mut request = self
                .inner
                .client
                .request(method.clone(), url.clone())
                .bearer_auth(token.expose_secret());
            if let Some(body) = body {
                request = request.json(body);
            }
            let response = request.send().await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                return decode(response).await;
            }
            if retried {
                warn!(%url, "Request still unauthorized after token refresh");
                return Err(ApiError::SessionExpired(
                    "token rejected after refresh".to_string(),
                ));
            }

            debug!(%url, "Access token rejected, recovering");
            retried = true;
            token = self.recover_token(&token).await?;
        }
    }

    /// Token to use for a new request, refreshing first if it is known to
    /// be expired.
    async fn current_token(&self) -> Result<SecretString, ApiError> {
        let token = self
            .inner
            .auth
            .access_token()
            .ok_or(ApiError::NotAuthenticated)?;

        if self.inner.auth.is_token_expired() && self.inner.auth.refresh_token().is_some() {
            debug!("Access token expired, refreshing before request");
            return self.refresh().await;
        }
        Ok(token)
    }

    /// Token to retry with after `rejected` got a 401.
    ///
    /// If another request already replaced the token, use that one instead
    /// of refreshing again.
    async fn recover_token(&self, rejected: &SecretString) -> Result<SecretString, ApiError> {
        let current = self
            .inner
            .auth
            .access_token()
            .ok_or_else(|| ApiError::SessionExpired("logged out".to_string()))?;

        if current.expose_secret() != rejected.expose_secret() {
            debug!("Token already refreshed by another request");
            return Ok(current);
        }
        self.refresh().await
    }

    /// Join or start the single in-flight refresh.
    ///
    /// Only a rejected refresh ends the session; an unreachable endpoint
    /// leaves it in place.
    async fn refresh(&self) -> Result<SecretString, ApiError> {
        let refresher = self.inner.refresher.clone();
        self.inner
            .refresh
            .get_or_start(move || async move { refresher.perform().await }.boxed())
            .await
            .map_err(|e| {
                if e.invalidates_session() {
                    ApiError::SessionExpired(e.to_string())
                } else {
                    ApiError::RefreshUnavailable(e.to_string())
                }
            })
    }
}

impl TokenRefresher {
    /// Call the refresh endpoint and store the new tokens.
    ///
    /// A rejected refresh logs the user out.
    #[instrument(skip(self))]
    async fn perform(&self) -> RefreshResult {
        let result = self.request_new_token().await;

        match &result {
            Ok(_) => debug!("Token refreshed"),
            Err(e) if e.invalidates_session() => {
                warn!(error = %e, "Token refresh rejected, logging out");
                if let Err(storage) = self.auth.logout() {
                    warn!(error = %storage, "Failed to purge auth session");
                }
            }
            Err(e) => warn!(error = %e, "Token refresh failed"),
        }
        result
    }

    async fn request_new_token(&self) -> RefreshResult {
        let refresh_token = self
            .auth
            .refresh_token()
            .ok_or(RefreshError::NoRefreshToken)?;

        let response = self
            .client
            .post(self.refresh_url.clone())
            .json(&RefreshRequest {
                refresh_token: refresh_token.expose_secret(),
            })
            .send()
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(if status.is_server_error() {
                RefreshError::Network(format!("HTTP {status}"))
            } else {
                RefreshError::Rejected(status.as_u16())
            });
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RefreshError::InvalidResponse(e.to_string()))?;

        let token = SecretString::from(body.token.clone());
        if let Err(e) = self
            .auth
            .update_tokens(body.token, body.refresh_token, body.expires_in)
        {
            warn!(error = %e, "Failed to persist refreshed tokens");
        }
        Ok(token)
    }
}

#[async_trait]
impl CartApi for HttpCartApi {
    #[instrument(skip(self))]
    async fn get_cart(&self) -> Result<CartSnapshot, ApiError> {
        self.send::<(), _>(Method::GET, "cart", None).await
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn add_item(&self, product_id: &ProductId, qty: u32) -> Result<CartSnapshot, ApiError> {
        let body = AddItemRequest { product_id, qty };
        self.send(Method::POST, "cart/items", Some(&body)).await
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    async fn update_item(
        &self,
        item_id: &LineItemId,
        qty: u32,
    ) -> Result<CartSnapshot, ApiError> {
        let path = format!("cart/items/{}", encode_segment(item_id.as_str()));
        self.send(Method::PATCH, &path, Some(&UpdateItemRequest { qty }))
            .await
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    async fn remove_item(&self, item_id: &LineItemId) -> Result<CartSnapshot, ApiError> {
        let path = format!("cart/items/{}", encode_segment(item_id.as_str()));
        self.send::<(), _>(Method::DELETE, &path, None).await
    }

    #[instrument(skip(self))]
    async fn clear_cart(&self) -> Result<CartSnapshot, ApiError> {
        self.send::<(), _>(Method::POST, "cart/clear", None).await
    }
}

impl std::fmt::Debug for HttpCartApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpCartApi")
            .field("base_url", &self.inner.base_url.as_str())
            .field("refresh", &self.inner.refresh)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Join an endpoint path onto the base URL, keeping the base's path prefix.
fn join(base: &Url, path: &str) -> Result<Url, ApiError> {
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Percent-encode a value used as a single path segment.
fn encode_segment(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

/// Map a non-401 response to a decoded body or an error.
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let text = response.text().await?;

    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound(error_message(&text)));
    }
    if !status.is_success() {
        warn!(
            status = %status,
            body = %preview(&text),
            "Cart API returned non-success status"
        );
        return Err(ApiError::Status {
            status: status.as_u16(),
            message: error_message(&text),
        });
    }

    serde_json::from_str(&text).map_err(|e| {
        warn!(error = %e, body = %preview(&text), "Failed to parse cart API response");
        ApiError::Parse(e)
    })
}

/// Pull `message` out of a JSON error body, falling back to the raw text.
fn error_message(text: &str) -> String {
    serde_json::from_str::<ErrorBody>(text)
        .ok()
        .and_then(|body| body.message)
        .unwrap_or_else(|| preview(text))
}

fn preview(text: &str) -> String {
    text.chars().take(BODY_PREVIEW_CHARS).collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_join_keeps_prefix() {
        let base = Url::parse("https://api.example.com/v2/").unwrap();
        assert_eq!(
            join(&base, "/cart/items").unwrap().as_str(),
            "https://api.example.com/v2/cart/items"
        );
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("ci_1"), "ci_1");
        assert_eq!(encode_segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn test_error_message_prefers_json() {
        assert_eq!(error_message(r#"{"message":"no stock"}"#), "no stock");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_preview_truncates() {
        let long = "x".repeat(BODY_PREVIEW_CHARS + 50);
        assert_eq!(preview(&long).len(), BODY_PREVIEW_CHARS);
    }
}

//! Integration tests for cartsync.
//!
//! Each test starts a `wiremock` server standing in for the storefront REST
//! API and drives a real [`HttpCartApi`] and [`CartStore`] against it.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p cartsync-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `wire_format` - request shapes, status mapping, wholesale replacement
//! - `token_refresh` - refresh on 401, single-flight refresh, refresh failure
//! - `sync_scenarios` - login sync, failures, overlapping responses

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use cartsync_client::{ApiConfig, AuthSession, AuthStore, CartStore, HttpCartApi, MemoryStore};
use cartsync_core::{CurrencyCode, LineInput, ProductId};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use url::Url;
use wiremock::MockServer;

/// Path prefix the API is mounted under on the mock server.
pub const API_PREFIX: &str = "/api/v1";

/// Full mock-server path for an API endpoint.
#[must_use]
pub fn route(endpoint: &str) -> String {
    format!("{API_PREFIX}{endpoint}")
}

/// A mock API server plus a client stack pointed at it.
pub struct TestContext {
    pub server: MockServer,
    pub storage: Arc<MemoryStore>,
    pub auth: AuthStore,
    pub api: HttpCartApi,
    pub store: CartStore,
}

impl TestContext {
    /// Start a mock server and build a signed-out client stack.
    ///
    /// # Panics
    ///
    /// Panics if the mock server URI cannot be parsed or the client cannot be
    /// built.
    #[allow(clippy::unwrap_used)]
    pub async fn new() -> Self {
        let server = MockServer::start().await;
        let base_url = Url::parse(&format!("{}{API_PREFIX}/", server.uri())).unwrap();

        let storage = Arc::new(MemoryStore::new());
        let auth = AuthStore::new(storage.clone());
        let api = HttpCartApi::new(&ApiConfig::new(base_url), auth.clone()).unwrap();
        let store = CartStore::new(Arc::new(api.clone()), auth.clone(), storage.clone());

        Self {
            server,
            storage,
            auth,
            api,
            store,
        }
    }

    /// Sign in with the given tokens (does not notify the cart store).
    ///
    /// # Panics
    ///
    /// Panics if the session cannot be persisted.
    #[allow(clippy::unwrap_used)]
    pub fn login(&self, token: &str, refresh_token: Option<&str>) {
        self.auth
            .login(AuthSession::new(
                None,
                token,
                refresh_token.map(str::to_string),
            ))
            .unwrap();
    }
}

/// Catalog data for a product priced at 12.50 USD.
#[must_use]
pub fn product(id: &str, stock: u32) -> LineInput {
    LineInput {
        product_id: ProductId::new(id),
        name: format!("Product {id}"),
        image: None,
        currency: CurrencyCode::default(),
        unit_price: Decimal::new(1250, 2),
        stock_limit: stock,
        vendor_id: None,
        vendor_name: None,
    }
}

/// A cart line as the server serializes it.
#[must_use]
pub fn line_json(item_id: &str, product_id: &str, quantity: u32, stock_limit: u32) -> Value {
    json!({
        "itemId": item_id,
        "productId": product_id,
        "name": format!("Product {product_id}"),
        "image": null,
        "currency": "USD",
        "unitPrice": "12.50",
        "quantity": quantity,
        "stockLimit": stock_limit,
        "vendorId": "v1",
        "vendorName": "Vendor One"
    })
}

/// A cart response body.
#[must_use]
pub fn cart_json(lines: &[Value]) -> Value {
    json!({ "items": lines })
}

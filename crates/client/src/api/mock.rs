//! In-memory [`CartApi`] implementation.
//!
//! Behaves like the storefront server: it owns the authoritative cart,
//! assigns `srv-N` line IDs, merges repeated adds and caps quantities at
//! stock. Each response is computed when the request "arrives" and then
//! delayed by the configured latency, so overlapping calls can complete out
//! of order.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use cartsync_core::{CartSnapshot, LineInput, LineItemId, ProductId};

use super::{ApiError, CartApi};

/// Status returned while the mock server is marked unavailable.
const UNAVAILABLE_STATUS: u16 = 503;

/// In-memory cart server.
///
/// Cheaply cloneable; clones share the same server state, so a test can keep
/// one handle for inspection while the store owns another.
#[derive(Clone, Default)]
pub struct MockCartApi {
    inner: Arc<MockInner>,
}

#[derive(Default)]
struct MockInner {
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

struct MockState {
    catalog: HashMap<ProductId, LineInput>,
    cart: CartSnapshot,
    next_id: u64,
    available: bool,
    session_valid: bool,
    latency: Duration,
    queued_latency: VecDeque<Duration>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            catalog: HashMap::new(),
            cart: CartSnapshot::empty(),
            next_id: 1,
            available: true,
            session_valid: true,
            latency: Duration::ZERO,
            queued_latency: VecDeque::new(),
        }
    }
}

impl MockCartApi {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a product the server will accept in `add_item`.
    #[must_use]
    pub fn with_product(self, product: LineInput) -> Self {
        self.lock()
            .catalog
            .insert(product.product_id.clone(), product);
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// When `false`, every call fails with a 503.
    pub fn set_available(&self, available: bool) {
        self.lock().available = available;
    }

    /// When `false`, every call fails with [`ApiError::SessionExpired`].
    pub fn set_session_valid(&self, valid: bool) {
        self.lock().session_valid = valid;
    }

    /// Delay applied to every response.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// Delay for the next call only, taking precedence over
    /// [`Self::set_latency`]. Queued delays are consumed in call order.
    pub fn push_latency(&self, latency: Duration) {
        self.lock().queued_latency.push_back(latency);
    }

    /// Change a product's stock. Existing lines are capped to the new limit.
    pub fn set_stock(&self, product_id: &ProductId, stock: u32) {
        let mut state = self.lock();
        if let Some(product) = state.catalog.get_mut(product_id) {
            product.stock_limit = stock;
        }
        for line in &mut state.cart.items {
            if &line.product_id == product_id {
                line.stock_limit = stock;
            }
        }
        state.cart.sanitize();
    }

    /// Number of calls received, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// The server's current cart.
    #[must_use]
    pub fn server_cart(&self) -> CartSnapshot {
        self.lock().cart.clone()
    }

    /// Replace the server's cart.
    pub fn set_server_cart(&self, cart: CartSnapshot) {
        self.lock().cart = cart;
    }

    /// Count the call, apply `op` to the server state, then wait out the
    /// latency before handing back the result.
    async fn respond<F>(&self, op: F) -> Result<CartSnapshot, ApiError>
    where
        F: FnOnce(&mut MockState) -> Result<(), ApiError> + Send,
    {
        let call = self.inner.calls.fetch_add(1, Ordering::SeqCst) + 1;

        let (result, delay) = {
            let mut state = self.lock();
            let delay = state.queued_latency.pop_front().unwrap_or(state.latency);
            let applied = state.check().and_then(|()| op(&mut *state));
            (applied.map(|()| state.cart.clone()), delay)
        };

        debug!(call, ok = result.is_ok(), ?delay, "Mock cart API call");
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        result
    }
}

impl MockState {
    fn check(&self) -> Result<(), ApiError> {
        if !self.session_valid {
            return Err(ApiError::SessionExpired("mock session invalid".to_string()));
        }
        if !self.available {
            return Err(ApiError::Status {
                status: UNAVAILABLE_STATUS,
                message: "service unavailable".to_string(),
            });
        }
        Ok(())
    }

    fn add(&mut self, product_id: &ProductId, qty: u32) -> Result<(), ApiError> {
        if let Some(line) = self
            .cart
            .items
            .iter_mut()
            .find(|line| &line.product_id == product_id)
        {
            line.quantity = line.quantity.saturating_add(qty).min(line.stock_limit);
            return Ok(());
        }

        let product = self
            .catalog
            .get(product_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("product {product_id}")))?;
        let quantity = qty.min(product.stock_limit);
        if quantity > 0 {
            let item_id = LineItemId::new(format!("srv-{}", self.next_id));
            self.next_id += 1;
            self.cart.items.push(product.into_line(item_id, quantity));
        }
        Ok(())
    }

    fn update(&mut self, item_id: &LineItemId, qty: u32) -> Result<(), ApiError> {
        if qty == 0 {
            return self.remove(item_id);
        }
        let line = self
            .cart
            .items
            .iter_mut()
            .find(|line| &line.item_id == item_id)
            .ok_or_else(|| ApiError::NotFound(format!("cart item {item_id}")))?;
        line.quantity = qty.min(line.stock_limit);
        self.cart.sanitize();
        Ok(())
    }

    fn remove(&mut self, item_id: &LineItemId) -> Result<(), ApiError> {
        if self.cart.remove(item_id) {
            Ok(())
        } else {
            Err(ApiError::NotFound(format!("cart item {item_id}")))
        }
    }
}

#[async_trait]
impl CartApi for MockCartApi {
    async fn get_cart(&self) -> Result<CartSnapshot, ApiError> {
        self.respond(|_| Ok(())).await
    }

    async fn add_item(&self, product_id: &ProductId, qty: u32) -> Result<CartSnapshot, ApiError> {
        self.respond(|state| state.add(product_id, qty)).await
    }

    async fn update_item(
        &self,
        item_id: &LineItemId,
        qty: u32,
    ) -> Result<CartSnapshot, ApiError> {
        self.respond(|state| state.update(item_id, qty)).await
    }

    async fn remove_item(&self, item_id: &LineItemId) -> Result<CartSnapshot, ApiError> {
        self.respond(|state| state.remove(item_id)).await
    }

    async fn clear_cart(&self) -> Result<CartSnapshot, ApiError> {
        self.respond(|state| {
            state.cart.items.clear();
            Ok(())
        })
        .await
    }
}

impl std::fmt::Debug for MockCartApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockCartApi")
            .field("calls", &self.call_count())
            .field("lines", &self.lock().cart.items.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use cartsync_core::CurrencyCode;
    use rust_decimal::Decimal;

    fn product(id: &str, stock: u32) -> LineInput {
        LineInput {
            product_id: ProductId::new(id),
            name: format!("Product {id}"),
            image: None,
            currency: CurrencyCode::default(),
            unit_price: Decimal::new(500, 2),
            stock_limit: stock,
            vendor_id: None,
            vendor_name: None,
        }
    }

    #[tokio::test]
    async fn test_add_merges_and_caps() {
        let api = MockCartApi::new().with_product(product("p1", 4));

        api.add_item(&ProductId::new("p1"), 3).await.unwrap();
        let cart = api.add_item(&ProductId::new("p1"), 3).await.unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 4);
        assert_eq!(cart.items[0].item_id.as_str(), "srv-1");
        assert_eq!(api.call_count(), 2);
    }

    #[tokio::test]
    async fn test_unknown_product_is_not_found() {
        let api = MockCartApi::new();
        let err = api.add_item(&ProductId::new("nope"), 1).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_zero_removes_and_missing_remove_is_not_found() {
        let api = MockCartApi::new().with_product(product("p1", 5));
        let cart = api.add_item(&ProductId::new("p1"), 1).await.unwrap();
        let id = cart.items[0].item_id.clone();

        let cart = api.update_item(&id, 0).await.unwrap();
        assert!(cart.is_empty());
        assert!(api.remove_item(&id).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_unavailable_leaves_state_untouched() {
        let api = MockCartApi::new().with_product(product("p1", 5));
        api.set_available(false);

        let err = api.add_item(&ProductId::new("p1"), 1).await.unwrap_err();
        assert!(matches!(err, ApiError::Status { status: 503, .. }));
        assert!(api.server_cart().is_empty());
    }

    #[tokio::test]
    async fn test_set_stock_caps_existing_lines() {
        let api = MockCartApi::new().with_product(product("p1", 5));
        api.add_item(&ProductId::new("p1"), 5).await.unwrap();

        api.set_stock(&ProductId::new("p1"), 2);
        assert_eq!(api.server_cart().items[0].quantity, 2);

        api.set_stock(&ProductId::new("p1"), 0);
        assert!(api.server_cart().is_empty());
    }
}

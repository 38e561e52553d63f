//! The cart store.
//!
//! Two regimes, chosen by whether the auth store holds a session:
//!
//! - **Guest**: mutations apply to the local snapshot immediately and are
//!   persisted under [`keys::CART`]
//! - **Signed in**: mutations go to the server first; the snapshot is only
//!   replaced, wholesale, by the server's response. A failed call leaves the
//!   snapshot as it was.
//!
//! Overlapping server calls each replace the snapshot when their response
//! arrives, so the last response wins. Responses that arrive after the user
//! signed in or out are discarded.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use cartsync_core::{CartSnapshot, LineInput, LineItemId, LineOutcome};

use super::error::{CartError, Result};
use super::state::{SyncPhase, SyncState};
use crate::api::{ApiError, CartApi};
use crate::auth::AuthStore;
use crate::storage::{KeyValueStore, SharedStore, StorageError, keys, load_json, save_json};

/// Cart snapshot plus synchronization state for one session.
///
/// Cheaply cloneable via `Arc`; all clones share the same cart.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartStoreInner>,
}

struct CartStoreInner {
    api: Arc<dyn CartApi>,
    auth: AuthStore,
    storage: SharedStore,
    state: Mutex<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    snapshot: CartSnapshot,
    phase: SyncPhase,
    open: bool,
    /// Bumped on every sign-in and sign-out; responses tagged with an older
    /// epoch are dropped.
    epoch: u64,
}

impl StoreState {
    /// Switch to the signed-in regime. The snapshot is kept until the first
    /// server response replaces it.
    fn enter_session(&mut self) {
        if self.phase.is_authenticated() {
            return;
        }
        self.epoch += 1;
        self.phase = self.phase.login();
    }

    fn leave_session(&mut self) {
        self.epoch += 1;
        self.phase = self.phase.logout();
        self.snapshot = CartSnapshot::empty();
    }
}

impl CartStore {
    /// Create a store with an empty cart.
    #[must_use]
    pub fn new(api: Arc<dyn CartApi>, auth: AuthStore, storage: SharedStore) -> Self {
        Self::with_snapshot(api, auth, storage, CartSnapshot::empty())
    }

    /// Create a store from the persisted cart.
    ///
    /// Lines that break the quantity bounds (over stock, or zero) are capped
    /// or dropped. A signed-in session starts unsynced; call
    /// [`Self::sync_with_server`] to fetch the server cart.
    ///
    /// # Errors
    ///
    /// Returns an error if storage cannot be read.
    pub fn restore(
        api: Arc<dyn CartApi>,
        auth: AuthStore,
        storage: SharedStore,
    ) -> std::result::Result<Self, StorageError> {
        let mut snapshot =
            load_json::<CartSnapshot>(storage.as_ref(), keys::CART)?.unwrap_or_default();
        let repaired = snapshot.sanitize();
        if repaired > 0 {
            warn!(repaired, "Repaired persisted cart lines outside stock bounds");
        }
        debug!(lines = snapshot.items.len(), "Restored cart");
        Ok(Self::with_snapshot(api, auth, storage, snapshot))
    }

    fn with_snapshot(
        api: Arc<dyn CartApi>,
        auth: AuthStore,
        storage: SharedStore,
        snapshot: CartSnapshot,
    ) -> Self {
        let phase = if auth.is_authenticated() {
            SyncPhase::AnonIdle.login()
        } else {
            SyncPhase::AnonIdle
        };
        Self {
            inner: Arc::new(CartStoreInner {
                api,
                auth,
                storage,
                state: Mutex::new(StoreState {
                    snapshot,
                    phase,
                    ..StoreState::default()
                }),
            }),
        }
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Add `qty` units of a product and open the cart.
    ///
    /// The outcome reports the quantity the line ended up with; it is lower
    /// than requested when stock ran out.
    ///
    /// # Errors
    ///
    /// Returns [`CartError::InvalidQuantity`] for `qty == 0`, or the server
    /// error when signed in (the cart is left unchanged).
    #[instrument(skip(self, input), fields(product_id = %input.product_id))]
    pub async fn add_item(&self, input: LineInput, qty: u32) -> Result<LineOutcome> {
        if qty == 0 {
            return Err(CartError::InvalidQuantity(qty));
        }

        let Some(mut flight) = self.begin_remote() else {
            let outcome = self.mutate_local(|snapshot| {
                let outcome = snapshot.add_local(input, qty);
                let changed = outcome.quantity > 0;
                (outcome, changed)
            });
            self.open_cart();
            log_clamp(&outcome);
            return Ok(outcome);
        };

        // Guest lines left over from a failed login sync are not on the server.
        let prior = if flight.synced {
            self.lock()
                .snapshot
                .line_for_product(&input.product_id)
                .map_or(0, |line| line.quantity)
        } else {
            0
        };

        let snapshot = flight.settle(self.inner.api.add_item(&input.product_id, qty).await)?;

        let line = snapshot.line_for_product(&input.product_id);
        let outcome = LineOutcome {
            item_id: line.map(|line| line.item_id.clone()),
            requested: prior.saturating_add(qty),
            quantity: line.map_or(0, |line| line.quantity),
        };
        self.apply(flight, snapshot)?;
        self.open_cart();
        log_clamp(&outcome);
        Ok(outcome)
    }

    /// Set a line's quantity.
    ///
    /// `qty <= 0` removes the line and returns `None`. Otherwise returns the
    /// outcome for the line, or `None` if no line has this ID.
    ///
    /// # Errors
    ///
    /// Returns the server error when signed in (the cart is left unchanged).
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn update_qty(&self, item_id: &LineItemId, qty: i64) -> Result<Option<LineOutcome>> {
        if qty <= 0 {
            self.remove_item(item_id).await?;
            return Ok(None);
        }
        let qty = u32::try_from(qty).unwrap_or(u32::MAX);

        let Some(mut flight) = self.begin_remote() else {
            let outcome = self.mutate_local(|snapshot| {
                let outcome = snapshot.set_quantity_local(item_id, qty);
                let changed = outcome.is_some();
                (outcome, changed)
            });
            if outcome.is_none() {
                debug!("No such line in guest cart");
            }
            if let Some(outcome) = &outcome {
                log_clamp(outcome);
            }
            return Ok(outcome);
        };

        let snapshot = flight.settle(self.inner.api.update_item(item_id, qty).await)?;

        let outcome = snapshot.line(item_id).map(|line| LineOutcome {
            item_id: Some(line.item_id.clone()),
            requested: qty,
            quantity: line.quantity,
        });
        self.apply(flight, snapshot)?;
        if let Some(outcome) = &outcome {
            log_clamp(outcome);
        }
        Ok(outcome)
    }

    /// Remove a line. Removing a line that does not exist is a no-op, also
    /// when the server answers 404.
    ///
    /// # Errors
    ///
    /// Returns the server error when signed in (the cart is left unchanged).
    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn remove_item(&self, item_id: &LineItemId) -> Result<()> {
        let Some(mut flight) = self.begin_remote() else {
            self.mutate_local(|snapshot| ((), snapshot.remove(item_id)));
            return Ok(());
        };

        match self.inner.api.remove_item(item_id).await {
            Err(ApiError::NotFound(message)) => {
                debug!(message, "Line already absent on server");
                flight.abandon();
                Ok(())
            }
            result => {
                let snapshot = flight.settle(result)?;
                self.apply(flight, snapshot)
            }
        }
    }

    /// Empty the cart. When signed in, the snapshot is only emptied once the
    /// server confirms.
    ///
    /// # Errors
    ///
    /// Returns the server error when signed in (the cart is left unchanged).
    #[instrument(skip(self))]
    pub async fn clear_cart(&self) -> Result<()> {
        let Some(mut flight) = self.begin_remote() else {
            self.mutate_local(|snapshot| {
                let changed = !snapshot.is_empty();
                snapshot.items.clear();
                ((), changed)
            });
            return Ok(());
        };

        let snapshot = flight.settle(self.inner.api.clear_cart().await)?;
        self.apply(flight, snapshot)
    }

    /// Replace the snapshot with the server's cart.
    ///
    /// Does nothing when signed out. Failures are logged and swallowed; the
    /// cart and its synced flag stay as they were. Returns `true` if a
    /// server snapshot was applied.
    #[instrument(skip(self))]
    pub async fn sync_with_server(&self) -> bool {
        let Some(mut flight) = self.begin_remote() else {
            debug!("Not signed in, skipping cart sync");
            return false;
        };

        let result = match flight.settle(self.inner.api.get_cart().await) {
            Ok(snapshot) => self.apply(flight, snapshot),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => {
                info!(
                    lines = self.lock().snapshot.items.len(),
                    "Cart synced with server"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Cart sync failed");
                false
            }
        }
    }

    /// Empty the local cart and purge it from storage without contacting
    /// the server. The cart is marked unsynced.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted cart cannot be removed.
    #[instrument(skip(self))]
    pub fn reset_cart(&self) -> Result<()> {
        let mut state = self.lock();
        state.snapshot = CartSnapshot::empty();
        state.phase = state.phase.desynced();
        self.inner.storage.remove(keys::CART)?;
        debug!("Cart reset");
        Ok(())
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    /// React to the user signing in or out.
    ///
    /// Signing in switches to the server regime and fetches the server cart,
    /// which replaces the guest lines. Signing out empties the cart and
    /// purges it from storage.
    #[instrument(skip(self))]
    pub async fn handle_auth_change(&self, authenticated: bool) {
        if authenticated {
            self.lock().enter_session();
            self.sync_with_server().await;
        } else {
            self.inner.sign_out("signed out");
        }
    }

    /// Follow the auth store's authenticated flag in a background task.
    ///
    /// The task lives as long as the auth store; abort the handle to stop it.
    pub fn watch_auth(&self) -> JoinHandle<()> {
        let mut changes = self.inner.auth.subscribe();
        let store = self.clone();
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let authenticated = *changes.borrow_and_update();
                debug!(authenticated, "Auth state changed");
                store.handle_auth_change(authenticated).await;
            }
        })
    }

    // =========================================================================
    // Visibility
    // =========================================================================

    pub fn open_cart(&self) {
        self.lock().open = true;
    }

    pub fn close_cart(&self) {
        self.lock().open = false;
    }

    /// Flip the cart's visibility and return the new value.
    pub fn toggle_cart(&self) -> bool {
        let mut state = self.lock();
        state.open = !state.open;
        state.open
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.lock().open
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// A copy of the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CartSnapshot {
        self.lock().snapshot.clone()
    }

    #[must_use]
    pub fn total_item_count(&self) -> u64 {
        self.lock().snapshot.total_item_count()
    }

    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.lock().snapshot.subtotal()
    }

    #[must_use]
    pub fn phase(&self) -> SyncPhase {
        self.lock().phase
    }

    #[must_use]
    pub fn sync_state(&self) -> SyncState {
        self.lock().phase.state()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock()
    }

    /// Bring the phase in line with the auth store, then start a server
    /// request if signed in. `None` means the guest regime applies.
    fn begin_remote(&self) -> Option<InFlight<'_>> {
        let authenticated = self.inner.auth.is_authenticated();
        let mut state = self.lock();

        if authenticated != state.phase.is_authenticated() {
            if authenticated {
                state.enter_session();
            } else {
                drop(state);
                self.inner.sign_out("signed out");
                return None;
            }
        }
        if !authenticated {
            return None;
        }

        let synced = state.phase.state().is_synced;
        state.phase = state.phase.begin_remote();
        Some(InFlight {
            inner: &self.inner,
            epoch: state.epoch,
            synced,
            settled: false,
        })
    }

    /// Apply a guest mutation and persist the result if `f` reports a change.
    fn mutate_local<T>(&self, f: impl FnOnce(&mut CartSnapshot) -> (T, bool)) -> T {
        let mut state = self.lock();
        state.phase = state.phase.begin_local();
        let (value, changed) = f(&mut state.snapshot);
        state.phase = state.phase.local_applied();
        if changed {
            persist(self.inner.storage.as_ref(), &state.snapshot);
        }
        value
    }

    /// Replace the snapshot with a server response.
    fn apply(&self, mut flight: InFlight<'_>, snapshot: CartSnapshot) -> Result<()> {
        flight.settled = true;
        let mut state = self.lock();
        if state.epoch != flight.epoch {
            debug!("Discarding response from a previous session");
            return Err(CartError::SessionChanged);
        }
        state.snapshot = snapshot;
        state.phase = state.phase.remote_succeeded();
        persist(self.inner.storage.as_ref(), &state.snapshot);
        Ok(())
    }
}

impl CartStoreInner {
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Leave the signed-in regime: empty the cart and purge it from storage.
    /// Does nothing for a guest cart.
    fn sign_out(&self, reason: &str) {
        let mut state = self.lock();
        if !state.phase.is_authenticated() {
            return;
        }
        state.leave_session();
        if let Err(e) = self.storage.remove(keys::CART) {
            warn!(error = %e, "Failed to purge persisted cart");
        }
        info!(reason, "Cart cleared");
    }
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("state", &*self.lock())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// InFlight
// =============================================================================

/// One outstanding server request.
///
/// Settling it moves the phase out of loading. If the request future is
/// dropped before that, `Drop` settles it as failed so loading never sticks.
struct InFlight<'a> {
    inner: &'a CartStoreInner,
    epoch: u64,
    /// Whether the snapshot matched the server when the request started.
    synced: bool,
    settled: bool,
}

impl InFlight<'_> {
    /// Pass a successful response through; settle a failure now.
    ///
    /// A session-expired failure also re-checks the auth store, so a
    /// sign-out caused by a failed token refresh clears the cart.
    fn settle(
        &mut self,
        result: std::result::Result<CartSnapshot, ApiError>,
    ) -> Result<CartSnapshot> {
        match result {
            Ok(snapshot) => Ok(snapshot),
            Err(e) => {
                self.fail();
                if e.is_session_expired() && !self.inner.auth.is_authenticated() {
                    self.inner.sign_out("session expired");
                }
                Err(e.into())
            }
        }
    }

    /// Settle without applying anything.
    fn abandon(mut self) {
        self.fail();
    }

    fn fail(&mut self) {
        if self.settled {
            return;
        }
        self.settled = true;
        let mut state = self.inner.lock();
        if state.epoch == self.epoch {
            state.phase = state.phase.remote_failed();
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.fail();
    }
}

fn persist(storage: &dyn KeyValueStore, snapshot: &CartSnapshot) {
    if let Err(e) = save_json(storage, keys::CART, snapshot) {
        warn!(error = %e, "Failed to persist cart");
    }
}

fn log_clamp(outcome: &LineOutcome) {
    if outcome.clamped() {
        warn!(
            requested = outcome.requested,
            quantity = outcome.quantity,
            "Quantity capped at stock limit"
        );
    }
}

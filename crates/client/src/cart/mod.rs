//! Cart synchronization.
//!
//! [`CartStore`] owns the cart snapshot and decides, per operation, whether
//! to mutate locally (guest) or go through the server (signed in).
//! [`SyncPhase`] tracks loading and synced state explicitly.

mod error;
mod state;
mod store;

pub use error::{CartError, Result};
pub use state::{SyncPhase, SyncState};
pub use store::CartStore;

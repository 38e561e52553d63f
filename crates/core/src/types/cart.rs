//! Cart lines and snapshots.
//!
//! A [`CartSnapshot`] is the whole cart at a point in time. Server responses
//! replace it wholesale; the guest cart is edited in place through the
//! `*_local` methods, which enforce `1 <= quantity <= stock_limit` by
//! clamping instead of rejecting.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{LineItemId, ProductId, VendorId};
use super::price::{CurrencyCode, Price};

/// One line item in the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Server-assigned ID, or a `local-` ID for guest lines.
    pub item_id: LineItemId,
    /// Catalog product this line refers to.
    pub product_id: ProductId,
    /// Product name at the time the line was added or last synced.
    pub name: String,
    /// Product image URL.
    #[serde(default)]
    pub image: Option<String>,
    /// Currency of `unit_price`.
    pub currency: CurrencyCode,
    /// Price of a single unit.
    pub unit_price: Decimal,
    /// Number of units, always at least 1.
    pub quantity: u32,
    /// Maximum orderable quantity, snapshotted from stock.
    pub stock_limit: u32,
    /// Selling vendor. Topup products have none.
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
    /// Selling vendor display name.
    #[serde(default)]
    pub vendor_name: Option<String>,
}

impl CartLine {
    /// Unit price with its currency.
    #[must_use]
    pub fn unit_price(&self) -> Price {
        Price::new(self.unit_price, self.currency.clone())
    }

    /// `unit_price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Catalog data needed to put a product into the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineInput {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
    pub currency: CurrencyCode,
    pub unit_price: Decimal,
    pub stock_limit: u32,
    #[serde(default)]
    pub vendor_id: Option<VendorId>,
    #[serde(default)]
    pub vendor_name: Option<String>,
}

impl LineInput {
    /// Build a cart line for this product.
    #[must_use]
    pub fn into_line(self, item_id: LineItemId, quantity: u32) -> CartLine {
        CartLine {
            item_id,
            product_id: self.product_id,
            name: self.name,
            image: self.image,
            currency: self.currency,
            unit_price: self.unit_price,
            quantity,
            stock_limit: self.stock_limit,
            vendor_id: self.vendor_id,
            vendor_name: self.vendor_name,
        }
    }
}

/// Result of a quantity change: what was asked for and what was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineOutcome {
    /// Line that was touched, if one exists after the change.
    pub item_id: Option<LineItemId>,
    /// Quantity the caller asked the line to end up with.
    pub requested: u32,
    /// Quantity the line actually has now (0 if no line exists).
    pub quantity: u32,
}

impl LineOutcome {
    /// Returns `true` if the stock limit reduced the requested quantity.
    #[must_use]
    pub const fn clamped(&self) -> bool {
        self.quantity < self.requested
    }
}

/// The whole cart at a point in time.
///
/// Totals are derived on every call and never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartSnapshot {
    /// Lines in insertion order.
    #[serde(default)]
    pub items: Vec<CartLine>,
}

impl CartSnapshot {
    /// An empty cart.
    #[must_use]
    pub const fn empty() -> Self {
        Self { items: Vec::new() }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of quantities across all lines.
    #[must_use]
    pub fn total_item_count(&self) -> u64 {
        self.items.iter().map(|line| u64::from(line.quantity)).sum()
    }

    /// Sum of `unit_price * quantity` across all lines.
    #[must_use]
    pub fn subtotal(&self) -> Decimal {
        self.items.iter().map(CartLine::line_total).sum()
    }

    /// Find a line by its ID.
    #[must_use]
    pub fn line(&self, item_id: &LineItemId) -> Option<&CartLine> {
        self.items.iter().find(|line| &line.item_id == item_id)
    }

    /// Find the line holding a product.
    #[must_use]
    pub fn line_for_product(&self, product_id: &ProductId) -> Option<&CartLine> {
        self.items.iter().find(|line| &line.product_id == product_id)
    }

    /// Add `qty` units of a product to the guest cart.
    ///
    /// An existing line for the same product is incremented; otherwise a new
    /// line with a `local-` ID is appended. The result is capped at the
    /// stock limit. A product with no stock adds nothing.
    pub fn add_local(&mut self, input: LineInput, qty: u32) -> LineOutcome {
        if let Some(line) = self
            .items
            .iter_mut()
            .find(|line| line.product_id == input.product_id)
        {
            let requested = line.quantity.saturating_add(qty);
            line.quantity = requested.min(line.stock_limit);
            return LineOutcome {
                item_id: Some(line.item_id.clone()),
                requested,
                quantity: line.quantity,
            };
        }

        let quantity = qty.min(input.stock_limit);
        if quantity == 0 {
            return LineOutcome {
                item_id: None,
                requested: qty,
                quantity: 0,
            };
        }

        let item_id = LineItemId::local();
        self.items.push(input.into_line(item_id.clone(), quantity));
        LineOutcome {
            item_id: Some(item_id),
            requested: qty,
            quantity,
        }
    }

    /// Set a guest line's quantity, capped at its stock limit.
    ///
    /// Returns `None` if no line has this ID. Callers route `qty == 0` to
    /// [`Self::remove`]; a line whose stock limit is 0 is removed here.
    pub fn set_quantity_local(&mut self, item_id: &LineItemId, qty: u32) -> Option<LineOutcome> {
        let line = self.items.iter_mut().find(|line| &line.item_id == item_id)?;
        line.quantity = qty.min(line.stock_limit);
        let outcome = LineOutcome {
            item_id: Some(line.item_id.clone()),
            requested: qty,
            quantity: line.quantity,
        };

        if outcome.quantity == 0 {
            self.remove(item_id);
            return Some(LineOutcome {
                item_id: None,
                ..outcome
            });
        }
        Some(outcome)
    }

    /// Remove a line. Returns `true` if a line was removed.
    pub fn remove(&mut self, item_id: &LineItemId) -> bool {
        let before = self.items.len();
        self.items.retain(|line| &line.item_id != item_id);
        self.items.len() != before
    }

    /// Enforce the quantity invariant on data of unknown provenance.
    ///
    /// Lines over their stock limit are capped; lines left with zero units
    /// are dropped. Returns the number of lines that were changed or dropped.
    pub fn sanitize(&mut self) -> usize {
        let mut touched = 0;
        for line in &mut self.items {
            if line.quantity > line.stock_limit {
                line.quantity = line.stock_limit;
                touched += 1;
            }
        }
        let before = self.items.len();
        self.items.retain(|line| line.quantity > 0);
        touched + (before - self.items.len())
    }
}

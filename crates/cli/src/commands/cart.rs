//! Cart commands.
//!
//! # Usage
//!
//! ```bash
//! # Show the cart (fetches the server cart when signed in)
//! cartsync show
//!
//! # Add a product (catalog data is used for the guest cart)
//! cartsync add prod_42 --name "Airtime 10" --price 10.00 --stock 5 --qty 2
//!
//! # Change or remove a line
//! cartsync update local-1b4e... 3
//! cartsync remove srv-7
//! ```

use std::io::Write;

use clap::Args;
use rust_decimal::Decimal;

use cartsync_core::{CurrencyCode, LineInput, LineItemId, LineOutcome, ProductId, VendorId};

use super::{CliError, Session};

/// Catalog data for `add`.
#[derive(Debug, Args)]
pub struct AddArgs {
    /// Product ID
    pub product_id: String,

    /// Number of units to add
    #[arg(short, long, default_value_t = 1)]
    pub qty: u32,

    /// Product display name
    #[arg(short, long)]
    pub name: String,

    /// Unit price (e.g. 12.50)
    #[arg(short, long)]
    pub price: Decimal,

    /// ISO 4217 currency code
    #[arg(short, long, default_value = "USD")]
    pub currency: String,

    /// Maximum orderable quantity
    #[arg(short, long)]
    pub stock: u32,

    /// Product image URL
    #[arg(long)]
    pub image: Option<String>,

    /// Selling vendor ID
    #[arg(long)]
    pub vendor_id: Option<String>,

    /// Selling vendor name
    #[arg(long)]
    pub vendor_name: Option<String>,
}

impl AddArgs {
    fn into_input(self) -> Result<(LineInput, u32), CliError> {
        let input = LineInput {
            product_id: ProductId::new(self.product_id),
            name: self.name,
            image: self.image,
            currency: CurrencyCode::parse(&self.currency)?,
            unit_price: self.price,
            stock_limit: self.stock,
            vendor_id: self.vendor_id.map(VendorId::new),
            vendor_name: self.vendor_name,
        };
        Ok((input, self.qty))
    }
}

/// Print the cart, syncing first when signed in unless `local` is set.
pub async fn show(session: &Session, local: bool) -> Result<(), CliError> {
    if !local && session.auth.is_authenticated() && !session.store.sync_with_server().await {
        tracing::warn!("Showing last known cart");
    }
    render(session)
}

pub async fn add(session: &Session, args: AddArgs) -> Result<(), CliError> {
    let (input, qty) = args.into_input()?;
    let outcome = session.store.add_item(input, qty).await?;
    report(&outcome)?;
    render(session)
}

pub async fn update(session: &Session, item_id: &str, qty: i64) -> Result<(), CliError> {
    let item_id = LineItemId::new(item_id);
    match session.store.update_qty(&item_id, qty).await? {
        Some(outcome) => report(&outcome)?,
        None if qty > 0 => tracing::info!(item_id = %item_id, "No such line"),
        None => {}
    }
    render(session)
}

pub async fn remove(session: &Session, item_id: &str) -> Result<(), CliError> {
    session.store.remove_item(&LineItemId::new(item_id)).await?;
    render(session)
}

pub async fn clear(session: &Session) -> Result<(), CliError> {
    session.store.clear_cart().await?;
    render(session)
}

/// Fetch the server cart. Fails if signed in and the fetch failed.
pub async fn sync(session: &Session) -> Result<(), CliError> {
    if !session.auth.is_authenticated() {
        tracing::info!("Not signed in; the guest cart is local only");
        return render(session);
    }
    if !session.store.sync_with_server().await {
        return Err(CliError::SyncFailed);
    }
    render(session)
}

fn report(outcome: &LineOutcome) -> Result<(), CliError> {
    if outcome.clamped() {
        let mut out = std::io::stdout().lock();
        writeln!(
            out,
            "Only {} of {} available; quantity capped.",
            outcome.quantity, outcome.requested
        )?;
    }
    Ok(())
}

/// Write the cart as a table followed by totals and sync state.
pub fn render(session: &Session) -> Result<(), CliError> {
    let snapshot = session.store.snapshot();
    let state = session.store.sync_state();
    let mut out = std::io::stdout().lock();

    if snapshot.is_empty() {
        writeln!(out, "Cart is empty.")?;
    }
    for line in &snapshot.items {
        writeln!(
            out,
            "{:<40} {:>4} x {:<24} {:>10} {}",
            line.item_id.as_str(),
            line.quantity,
            line.name,
            line.line_total(),
            line.currency
        )?;
        if let Some(vendor) = &line.vendor_name {
            writeln!(out, "{:<40}        sold by {vendor}", "")?;
        }
    }

    let currency = snapshot
        .items
        .first()
        .map_or_else(CurrencyCode::default, |line| line.currency.clone());
    writeln!(
        out,
        "\nItems: {}   Subtotal: {} {}",
        snapshot.total_item_count(),
        snapshot.subtotal(),
        currency
    )?;
    writeln!(
        out,
        "Signed in: {}   Synced: {}",
        yes_no(state.is_authenticated),
        yes_no(state.is_synced)
    )?;
    Ok(())
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn args(currency: &str) -> AddArgs {
        AddArgs {
            product_id: "p1".to_string(),
            qty: 2,
            name: "Airtime 10".to_string(),
            price: Decimal::new(1000, 2),
            currency: currency.to_string(),
            stock: 5,
            image: None,
            vendor_id: Some("v1".to_string()),
            vendor_name: Some("Telco".to_string()),
        }
    }

    #[test]
    fn test_add_args_into_input() {
        let (input, qty) = args("ngn").into_input().unwrap();
        assert_eq!(qty, 2);
        assert_eq!(input.product_id.as_str(), "p1");
        assert_eq!(input.currency.as_str(), "NGN");
        assert_eq!(input.vendor_id.unwrap().as_str(), "v1");
    }

    #[test]
    fn test_add_args_rejects_bad_currency() {
        assert!(matches!(
            args("naira").into_input(),
            Err(CliError::Currency(_))
        ));
    }
}

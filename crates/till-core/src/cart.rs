//! # Cart Engine
//!
//! Pure computation of cart lines and totals. Every mutating operation on
//! the server goes through the inventory hold ledger *before* the cart is
//! touched (see till-engine), so this module never needs to know about
//! stock; it only keeps the lines and the math consistent.
//!
//! ## Operations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Operations                                      │
//! │                                                                         │
//! │  add_item(product, qty) ───► merge by SKU, or append a new line         │
//! │  update_quantity(id, qty) ─► qty ≤ 0 behaves as remove_item             │
//! │  remove_item(id) ──────────► returns the removed line (hold release)    │
//! │  clear() ──────────────────► empties the cart                           │
//! │  totals(rate) ─────────────► subtotal = Σ(price × qty)                  │
//! │                              tax = subtotal × rate                      │
//! │                              total = subtotal + tax                     │
//! │                                                                         │
//! │  Totals are recomputed after EVERY mutation, never cached by callers.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::{Money, TaxRate};
use crate::types::Product;
use crate::{MAX_CART_LINES, MAX_LINE_QUANTITY};

// =============================================================================
// Cart Item
// =============================================================================

/// A line in a session's cart.
///
/// Snapshot pattern: sku/name/price are frozen at add time so the cart
/// displays consistent data even if the catalog changes underneath it.
/// The line id is stable and session-scoped; quantity merges never
/// change it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Stable line identifier (UUID v4), unique within the session.
    pub id: String,

    /// Parent product grouping.
    pub product_id: String,

    /// SKU the hold ledger keys on.
    pub sku_id: String,

    /// Product name at time of adding (frozen).
    pub name: String,

    /// Barcode at time of adding, if the SKU has one.
    pub barcode: Option<String>,

    /// SKU code at time of adding (frozen).
    pub sku_code: String,

    /// Price in cents at time of adding (frozen).
    pub unit_price_cents: i64,

    /// Quantity in cart, always ≥ 1.
    pub quantity: i64,

    pub size: Option<String>,
    pub length: Option<String>,

    /// Image reference for the terminal UI.
    pub image_url: Option<String>,

    /// Whether this line absorbs the card fee instead of passing it on.
    pub absorbs_fee: bool,

    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Freezes a product into a new cart line.
    pub fn from_product(product: &Product, quantity: i64) -> Self {
        CartItem {
            id: Uuid::new_v4().to_string(),
            product_id: product.product_id.clone(),
            sku_id: product.id.clone(),
            name: product.name.clone(),
            barcode: product.barcode.clone(),
            sku_code: product.sku_code.clone(),
            unit_price_cents: product.price_cents,
            quantity,
            size: product.size.clone(),
            length: product.length.clone(),
            image_url: product.image_url.clone(),
            absorbs_fee: false,
            added_at: Utc::now(),
        }
    }

    /// Line total before tax (unit_price × quantity).
    #[inline]
    pub fn line_total_cents(&self) -> i64 {
        Money::from_cents(self.unit_price_cents)
            .multiply_quantity(self.quantity)
            .cents()
    }
}

// =============================================================================
// Cart
// =============================================================================

/// The ordered set of lines in a session.
///
/// ## Invariants
/// - lines are unique by line id; adding the same SKU merges quantity
/// - quantity per line is 1..=[`MAX_LINE_QUANTITY`]
/// - at most [`MAX_CART_LINES`] distinct lines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Cart { items: Vec::new() }
    }

    /// Adds a product to the cart, merging with an existing line for the
    /// same SKU instead of duplicating rows.
    ///
    /// ## Returns
    /// The id of the line that now carries the quantity.
    pub fn add_item(&mut self, product: &Product, quantity: i64) -> CoreResult<String> {
        if quantity < 1 {
            return Err(CoreError::QuantityTooSmall { requested: quantity });
        }

        if let Some(item) = self.items.iter_mut().find(|i| i.sku_id == product.id) {
            let new_qty = item.quantity + quantity;
            if new_qty > MAX_LINE_QUANTITY {
                return Err(CoreError::QuantityTooLarge {
                    requested: new_qty,
                    max: MAX_LINE_QUANTITY,
                });
            }
            item.quantity = new_qty;
            return Ok(item.id.clone());
        }

        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_LINE_QUANTITY,
            });
        }
        if self.items.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge { max: MAX_CART_LINES });
        }

        let item = CartItem::from_product(product, quantity);
        let id = item.id.clone();
        self.items.push(item);
        Ok(id)
    }

    /// Updates the quantity of a line.
    ///
    /// A quantity of zero or less behaves as [`Cart::remove_item`]; the
    /// removed line is returned so the caller can release its hold.
    pub fn update_quantity(
        &mut self,
        item_id: &str,
        quantity: i64,
    ) -> CoreResult<Option<CartItem>> {
        if quantity <= 0 {
            return self.remove_item(item_id).map(Some);
        }

        if quantity > MAX_LINE_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_LINE_QUANTITY,
            });
        }

        match self.items.iter_mut().find(|i| i.id == item_id) {
            Some(item) => {
                item.quantity = quantity;
                Ok(None)
            }
            None => Err(CoreError::ItemNotInCart {
                item_id: item_id.to_string(),
            }),
        }
    }

    /// Removes a line by id, returning it.
    pub fn remove_item(&mut self, item_id: &str) -> CoreResult<CartItem> {
        match self.items.iter().position(|i| i.id == item_id) {
            Some(pos) => Ok(self.items.remove(pos)),
            None => Err(CoreError::ItemNotInCart {
                item_id: item_id.to_string(),
            }),
        }
    }

    /// Empties the cart.
    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Finds a line by id.
    pub fn item(&self, item_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Finds the line carrying a given SKU, if any.
    pub fn line_for_sku(&self, sku_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.sku_id == sku_id)
    }

    /// Total quantity currently carried for a SKU (0 if absent).
    pub fn quantity_for_sku(&self, sku_id: &str) -> i64 {
        self.items
            .iter()
            .filter(|i| i.sku_id == sku_id)
            .map(|i| i.quantity)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of distinct lines.
    pub fn line_count(&self) -> usize {
        self.items.len()
    }

    /// Total quantity across all lines.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Subtotal before tax.
    pub fn subtotal_cents(&self) -> i64 {
        self.items.iter().map(|i| i.line_total_cents()).sum()
    }

    /// Recomputes all totals at the given tax rate.
    pub fn totals(&self, rate: TaxRate) -> CartTotals {
        let subtotal = Money::from_cents(self.subtotal_cents());
        let tax = subtotal.calculate_tax(rate);
        CartTotals {
            line_count: self.line_count(),
            total_quantity: self.total_quantity(),
            subtotal_cents: subtotal.cents(),
            tax_cents: tax.cents(),
            total_cents: (subtotal + tax).cents(),
        }
    }
}

/// Cart totals summary, recomputed after every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub line_count: usize,
    pub total_quantity: i64,
    pub subtotal_cents: i64,
    pub tax_cents: i64,
    pub total_cents: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

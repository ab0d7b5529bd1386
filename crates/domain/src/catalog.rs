//! Catalog and cart records as seen by checkout.
//!
//! These are read-only views of collaborators the engine does not own; the
//! catalog and the cart are maintained elsewhere.

use common::ProductId;
use serde::{Deserialize, Serialize};

use crate::order::{LineItem, Money};

/// Catalog entry for a product. Stock lives in the stock ledger, not here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub title: String,
    pub price: Money,
    #[serde(default)]
    pub image_ref: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub weight_grams: u32,
}

impl Product {
    /// Snapshots this product into an order line.
    pub fn snapshot(&self, qty: u32) -> LineItem {
        LineItem {
            product_id: self.id.clone(),
            title: self.title.clone(),
            unit_price: self.price,
            qty,
            image_ref: self.image_ref.clone(),
            sku: self.sku.clone(),
            weight_grams: self.weight_grams,
        }
    }
}

/// One line of a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: ProductId,
    pub qty: u32,
}

impl CartLine {
    pub fn new(product_id: impl Into<ProductId>, qty: u32) -> Self {
        Self {
            product_id: product_id.into(),
            qty,
        }
    }
}

use async_trait::async_trait;
use common::{CheckoutSessionId, OrderId, ProductId, UserId};
use domain::{CartLine, Order, Product};

use crate::Result;

/// Persistent record of orders and their audit trail.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order.
    ///
    /// Returns the stored order at version 1. Fails with
    /// `DuplicateCheckoutSession` if the session already has an order.
    async fn insert_order(&self, order: &Order) -> Result<Order>;

    /// Loads an order by id.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads the order created for a checkout session, scoped to its owner.
    async fn find_order_by_session(
        &self,
        owner_id: UserId,
        checkout_session_id: &CheckoutSessionId,
    ) -> Result<Option<Order>>;

    /// Replaces a stored order if its version still equals `order.version()`.
    ///
    /// Returns the stored order with its new version. Fails with
    /// `ConcurrencyConflict` if another write landed first.
    async fn update_order(&self, order: &Order) -> Result<Order>;
}

/// Outcome of a stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    /// Stock was decremented, floored at zero.
    Applied { remaining: u32 },

    /// A movement for this order and product was already recorded.
    AlreadyApplied,

    /// The product is not in the catalog.
    ProductMissing,
}

/// Per-product available quantity.
#[async_trait]
pub trait StockLedger: Send + Sync {
    /// Returns the available quantity, or `None` for an unknown product.
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>>;

    /// Atomically decrements stock by `qty`, flooring at zero.
    ///
    /// At most one movement is applied per `(order_id, product_id)`.
    async fn decrement_stock(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        qty: u32,
    ) -> Result<StockDecrement>;
}

/// Read access to the product catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;
}

/// Read and clear access to users' carts.
#[async_trait]
pub trait CartStore: Send + Sync {
    /// Returns the lines of a user's cart in insertion order.
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>>;

    /// Empties a user's cart. Clearing an empty cart is not an error.
    async fn clear_cart(&self, user_id: UserId) -> Result<()>;
}

/// Everything checkout needs from persistence.
pub trait CommerceStore: OrderStore + StockLedger + Catalog + CartStore {}

// Blanket implementation for every store that provides all four capabilities
impl<T: OrderStore + StockLedger + Catalog + CartStore + ?Sized> CommerceStore for T {}

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CheckoutSessionId, OrderId, ProductId, UserId};
use domain::{CartLine, Order, Product};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{CartStore, Catalog, OrderStore, StockDecrement, StockLedger},
};

#[derive(Default)]
struct State {
    orders: HashMap<OrderId, Order>,
    products: HashMap<ProductId, Product>,
    stock: HashMap<ProductId, u32>,
    movements: HashSet<(OrderId, ProductId)>,
    carts: HashMap<UserId, Vec<CartLine>>,
}

/// In-memory store implementation for testing and local runs.
///
/// This implementation keeps everything behind a single lock and provides
/// the same guarantees as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a catalog product and sets its stock.
    pub async fn upsert_product(&self, product: Product, stock: u32) {
        let mut state = self.state.write().await;
        state.stock.insert(product.id.clone(), stock);
        state.products.insert(product.id.clone(), product);
    }

    /// Removes a product from the catalog and the ledger.
    pub async fn remove_product(&self, product_id: &ProductId) {
        let mut state = self.state.write().await;
        state.products.remove(product_id);
        state.stock.remove(product_id);
    }

    /// Adds a line to a user's cart.
    pub async fn add_to_cart(&self, user_id: UserId, line: CartLine) {
        self.state
            .write()
            .await
            .carts
            .entry(user_id)
            .or_default()
            .push(line);
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stock movements recorded.
    pub async fn movement_count(&self) -> usize {
        self.state.read().await.movements.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryStore {
    async fn insert_order(&self, order: &Order) -> Result<Order> {
        let mut state = self.state.write().await;

        if let Some(session_id) = order.checkout_session_id()
            && state
                .orders
                .values()
                .any(|existing| existing.checkout_session_id() == Some(session_id))
        {
            return Err(StoreError::DuplicateCheckoutSession(session_id.clone()));
        }

        let mut stored = order.clone();
        stored.set_version(1);
        state.orders.insert(stored.id(), stored.clone());
        Ok(stored)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn find_order_by_session(
        &self,
        owner_id: UserId,
        checkout_session_id: &CheckoutSessionId,
    ) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .values()
            .find(|order| {
                order.owner_id() == owner_id
                    && order.checkout_session_id() == Some(checkout_session_id)
            })
            .cloned())
    }

    async fn update_order(&self, order: &Order) -> Result<Order> {
        let mut state = self.state.write().await;

        let current = state
            .orders
            .get_mut(&order.id())
            .ok_or(StoreError::OrderNotFound(order.id()))?;

        if current.version() != order.version() {
            return Err(StoreError::ConcurrencyConflict {
                order_id: order.id(),
                expected: order.version(),
                actual: current.version(),
            });
        }

        let mut stored = order.clone();
        stored.set_version(order.version() + 1);
        *current = stored.clone();
        Ok(stored)
    }
}

#[async_trait]
impl StockLedger for InMemoryStore {
    async fn stock_level(&self, product_id: &ProductId) -> Result<Option<u32>> {
        Ok(self.state.read().await.stock.get(product_id).copied())
    }

    async fn decrement_stock(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        qty: u32,
    ) -> Result<StockDecrement> {
        let mut state = self.state.write().await;
        let State {
            stock, movements, ..
        } = &mut *state;

        let Some(level) = stock.get_mut(product_id) else {
            return Ok(StockDecrement::ProductMissing);
        };

        if !movements.insert((order_id, product_id.clone())) {
            return Ok(StockDecrement::AlreadyApplied);
        }

        *level = level.saturating_sub(qty);
        Ok(StockDecrement::Applied { remaining: *level })
    }
}

#[async_trait]
impl Catalog for InMemoryStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(product_id).cloned())
    }
}

#[async_trait]
impl CartStore for InMemoryStore {
    async fn cart_lines(&self, user_id: UserId) -> Result<Vec<CartLine>> {
        Ok(self
            .state
            .read()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_cart(&self, user_id: UserId) -> Result<()> {
        self.state.write().await.carts.remove(&user_id);
        Ok(())
    }
}

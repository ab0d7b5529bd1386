//! Load-mutate-save of orders with optimistic concurrency.

use common::OrderId;
use domain::Order;
use store::{OrderStore, StoreError};

use crate::error::{Result, ServiceError};

/// Attempts made before a contended write gives up.
pub const MAX_ATTEMPTS: usize = 3;

/// Outcome of a mutation.
#[derive(Debug)]
pub struct Mutation<T> {
    /// The order as stored after the mutation.
    pub order: Order,

    /// Whatever the mutation closure returned.
    pub value: T,

    /// False when the closure left the order untouched and nothing was written.
    pub changed: bool,
}

/// Applies closures to stored orders.
///
/// The handler is responsible for:
/// 1. Loading the order and remembering its version
/// 2. Running the closure against the loaded state
/// 3. Writing the result back with a compare-and-set on the version
/// 4. Reloading and re-running the closure if another write landed first
#[derive(Clone)]
pub struct OrderRepository<S> {
    store: S,
}

impl<S: OrderStore> OrderRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Loads an order, failing if it does not exist.
    pub async fn load(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(ServiceError::OrderNotFound(order_id))
    }

    /// Runs `mutate` against the current order and persists the result.
    ///
    /// The closure may run more than once; on every retry it sees the reloaded
    /// order, so idempotent mutations turn into no-ops once another writer has
    /// already reached the target state.
    pub async fn execute<T, F>(&self, order_id: OrderId, mut mutate: F) -> Result<Mutation<T>>
    where
        F: FnMut(&mut Order) -> Result<T>,
    {
        for attempt in 1..=MAX_ATTEMPTS {
            let mut order = self.load(order_id).await?;
            let loaded = order.clone();

            let value = mutate(&mut order)?;

            if order == loaded {
                return Ok(Mutation {
                    order,
                    value,
                    changed: false,
                });
            }

            match self.store.update_order(&order).await {
                Ok(stored) => {
                    return Ok(Mutation {
                        order: stored,
                        value,
                        changed: true,
                    });
                }
                Err(StoreError::ConcurrencyConflict { .. }) => {
                    tracing::debug!(%order_id, attempt, "order changed concurrently, reloading");
                    metrics::counter!("order_write_conflicts_total").increment(1);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::ConcurrencyConflict(order_id))
    }
}

//! Post-payment order handling: shipment tracking and admin status changes.

use std::sync::Arc;

use common::OrderId;
use domain::{Actor, FulfillmentPatch, Order, OrderStatus};
use store::OrderStore;

use crate::error::Result;
use crate::notifications::{Notification, NotificationDispatcher};
use crate::repository::OrderRepository;

#[derive(Clone)]
pub struct FulfillmentService<S> {
    orders: OrderRepository<S>,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl<S> FulfillmentService<S>
where
    S: OrderStore + Clone,
{
    pub fn new(store: S, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self {
            orders: OrderRepository::new(store),
            notifier,
        }
    }

    /// Merges tracking data into the order.
    ///
    /// A tracking id on a paid order ships it; a delivery time on a shipped
    /// order delivers it. Both can happen in one patch.
    #[tracing::instrument(skip(self, patch), fields(order_id = %order_id))]
    pub async fn update_fulfillment(
        &self,
        order_id: OrderId,
        patch: FulfillmentPatch,
        actor: Option<Actor>,
    ) -> Result<Order> {
        let mutation = self
            .orders
            .execute(order_id, |order| Ok(order.apply_fulfillment(&patch, actor)?))
            .await?;

        for status in &mutation.value {
            self.notify(&mutation.order, *status).await;
        }

        Ok(mutation.order)
    }

    /// Admin override to `shipped`, `delivered` or `cancelled`.
    #[tracing::instrument(skip(self, actor), fields(order_id = %order_id, actor_id = %actor.id))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        next: OrderStatus,
        actor: Actor,
        note: Option<String>,
    ) -> Result<Order> {
        let mutation = self
            .orders
            .execute(order_id, |order| {
                Ok(order.apply_manual_status(next, actor, note.clone())?)
            })
            .await?;

        if mutation.value {
            tracing::info!(status = %next, "order status set by admin");
            self.notify(&mutation.order, next).await;
        }

        Ok(mutation.order)
    }

    async fn notify(&self, order: &Order, status: OrderStatus) {
        let notification = match status {
            OrderStatus::Shipped => Notification::order_shipped(order.id(), order.owner_id()),
            OrderStatus::Delivered => Notification::order_delivered(order.id(), order.owner_id()),
            OrderStatus::Cancelled => Notification::order_cancelled(order.id(), order.owner_id()),
            _ => return,
        };
        self.notifier.enqueue(notification).await;
    }
}

//! Payment reconciliation: drives orders to `paid` or `failed` from
//! gateway confirmations, and issues refunds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{OrderId, ProductId};
use domain::{Actor, Money, Order, OrderError, OrderStatus, PaymentProvider, PaymentStatus, Refund};
use store::{CommerceStore, StockDecrement};

use crate::error::{Result, ServiceError};
use crate::gateway::GatewayRegistry;
use crate::notifications::{Notification, NotificationDispatcher};
use crate::repository::OrderRepository;

/// Applies gateway outcomes to orders.
///
/// Every operation is safe to repeat: replays of an already applied
/// confirmation return the stored order without touching stock, the cart or
/// notifications.
#[derive(Clone)]
pub struct ReconciliationService<S> {
    orders: OrderRepository<S>,
    gateways: GatewayRegistry,
    notifier: Arc<dyn NotificationDispatcher>,
}

impl<S> ReconciliationService<S>
where
    S: CommerceStore + Clone,
{
    pub fn new(
        store: S,
        gateways: GatewayRegistry,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            orders: OrderRepository::new(store),
            gateways,
            notifier,
        }
    }

    /// Confirms payment for a `payment_pending` order.
    ///
    /// Stock is decremented before the order is written; the ledger applies
    /// at most one movement per order and product, so concurrent
    /// confirmations decrement once. Decrements that cannot be applied are
    /// recorded on the order instead of failing the confirmation.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_paid(
        &self,
        order_id: OrderId,
        provider: PaymentProvider,
        gateway_reference: &str,
    ) -> Result<Order> {
        let started = Instant::now();
        let order = self.orders.load(order_id).await?;

        if order.payment_status() == PaymentStatus::Paid {
            metrics::counter!("reconciliation_duplicates_total", "outcome" => "paid").increment(1);
            tracing::debug!("payment already confirmed");
            return Ok(order);
        }

        if order.status() != OrderStatus::PaymentPending {
            return Err(OrderError::invalid_transition(order.status(), OrderStatus::Paid).into());
        }

        let (decremented, anomalies) = self.decrement_stock(&order).await;

        let mutation = match self
            .orders
            .execute(order_id, |order| {
                let paid = order.mark_paid(provider, gateway_reference)?;
                if paid {
                    for (product_id, reason) in &anomalies {
                        order.record_stock_anomaly(product_id.clone(), reason.clone());
                    }
                }
                Ok(paid)
            })
            .await
        {
            Ok(mutation) => mutation,
            Err(e) => {
                self.record_orphaned_decrements(order_id, &decremented, &e).await;
                return Err(e);
            }
        };

        if !mutation.value {
            metrics::counter!("reconciliation_duplicates_total", "outcome" => "paid").increment(1);
            tracing::debug!("payment confirmed concurrently");
            return Ok(mutation.order);
        }

        let order = mutation.order;
        if let Err(e) = self.orders.store().clear_cart(order.owner_id()).await {
            tracing::warn!(user_id = %order.owner_id(), error = %e, "failed to clear cart after payment");
        }

        self.notifier
            .enqueue(Notification::order_paid(order_id, order.owner_id()))
            .await;
        self.notifier
            .enqueue(Notification::invoice_ready(order_id, order.owner_id()))
            .await;

        metrics::counter!("orders_paid_total", "provider" => provider.as_str()).increment(1);
        metrics::histogram!("reconciliation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(%provider, gateway_reference, grand_total = %order.grand_total(), "order paid");

        Ok(order)
    }

    /// Decrements stock for every product on the order. Returns the products
    /// decremented by this call and the anomalies met on the way.
    async fn decrement_stock(&self, order: &Order) -> (Vec<ProductId>, Vec<(ProductId, String)>) {
        let store = self.orders.store();
        let mut decremented = Vec::new();
        let mut anomalies = Vec::new();

        // The ledger keeps one movement per product, so repeated lines are summed
        let mut quantities: BTreeMap<&ProductId, u32> = BTreeMap::new();
        for item in order.items() {
            *quantities.entry(&item.product_id).or_default() += item.qty;
        }

        for (product_id, qty) in quantities {
            let reason = match store.decrement_stock(order.id(), product_id, qty).await {
                Ok(StockDecrement::Applied { remaining }) => {
                    tracing::debug!(%product_id, qty, remaining, "stock decremented");
                    decremented.push(product_id.clone());
                    continue;
                }
                Ok(StockDecrement::AlreadyApplied) => {
                    tracing::debug!(%product_id, "stock movement already recorded");
                    continue;
                }
                Ok(StockDecrement::ProductMissing) => "product missing from stock ledger".to_string(),
                Err(e) => format!("stock decrement failed: {e}"),
            };

            tracing::warn!(order_id = %order.id(), %product_id, %reason, "stock anomaly");
            metrics::counter!("stock_anomalies_total").increment(1);
            anomalies.push((product_id.clone(), reason));
        }

        (decremented, anomalies)
    }

    /// Stock went out for an order that another writer moved away from
    /// `payment_pending` first. The movement stays; the order records it.
    async fn record_orphaned_decrements(
        &self,
        order_id: OrderId,
        decremented: &[ProductId],
        cause: &ServiceError,
    ) {
        if decremented.is_empty() {
            return;
        }

        tracing::warn!(
            products = decremented.len(),
            error = %cause,
            "stock decremented but payment not applied"
        );
        metrics::counter!("stock_anomalies_total").increment(decremented.len() as u64);

        let reason = format!("stock decremented but payment not applied: {cause}");
        let recorded = self
            .orders
            .execute(order_id, |order| {
                for product_id in decremented {
                    order.record_stock_anomaly(product_id.clone(), reason.clone());
                }
                Ok(())
            })
            .await;
        if let Err(e) = recorded {
            tracing::error!(error = %e, "failed to record stock anomaly");
        }
    }

    /// Records a payment failure. No-op if the order is already paid or
    /// already failed.
    #[tracing::instrument(skip(self), fields(order_id = %order_id))]
    pub async fn mark_failed(&self, order_id: OrderId, reason: &str) -> Result<Order> {
        let mutation = self
            .orders
            .execute(order_id, |order| Ok(order.mark_failed(reason)?))
            .await?;

        let order = mutation.order;
        if !mutation.value {
            metrics::counter!("reconciliation_duplicates_total", "outcome" => "failed").increment(1);
            tracing::debug!(status = %order.status(), "payment failure ignored");
            return Ok(order);
        }

        self.notifier
            .enqueue(Notification::payment_failed(order_id, order.owner_id()))
            .await;

        metrics::counter!("orders_payment_failed_total").increment(1);
        tracing::info!(reason, "order payment failed");

        Ok(order)
    }

    /// Refunds part or all of a paid order through its gateway.
    #[tracing::instrument(skip(self, actor), fields(order_id = %order_id, actor_id = %actor.id))]
    pub async fn refund(
        &self,
        order_id: OrderId,
        amount: Money,
        reason: Option<String>,
        actor: Actor,
    ) -> Result<Order> {
        let order = self.orders.load(order_id).await?;
        order.check_refund(amount)?;

        let (Some(provider), Some(reference)) = (order.payment_provider(), order.payment_reference())
        else {
            return Err(OrderError::NotPaid.into());
        };
        let gateway = self
            .gateways
            .get(provider)
            .ok_or(ServiceError::UnknownGateway(provider))?;

        let refund_id = gateway.refund(reference, amount).await?;
        let refund = Refund {
            refund_id,
            amount,
            provider,
            reason,
            at: Utc::now(),
        };

        let mutation = self
            .orders
            .execute(order_id, |order| {
                order.record_refund(refund.clone())?;
                Ok(())
            })
            .await
            .inspect_err(|e| {
                tracing::error!(refund_id = %refund.refund_id, error = %e, "refund issued but not recorded");
            })?;

        metrics::counter!("refunds_total", "provider" => provider.as_str()).increment(1);
        tracing::info!(refund_id = %refund.refund_id, %amount, "refund recorded");

        Ok(mutation.order)
    }
}

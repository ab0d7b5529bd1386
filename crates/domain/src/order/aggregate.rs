//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CheckoutSessionId, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use crate::pricing::{Pricing, ShippingMethod};

use super::{
    Actor, Address, Fulfillment, FulfillmentPatch, LineItem, Money, OrderError, OrderStatus,
    PaymentProvider, PaymentStatus, Refund, StatusChange, StockAnomaly,
};

/// Order aggregate root.
///
/// Represents an order from the moment a cart is converted into a draft until
/// it is delivered, fails payment or is cancelled. All status changes go
/// through [`Order::transition`], which also appends the history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: OrderId,
    checkout_session_id: Option<CheckoutSessionId>,
    owner_id: UserId,

    /// Snapshot taken at session init. There is no mutator.
    items: Vec<LineItem>,

    pricing: Option<Pricing>,
    shipping_address: Option<Address>,
    billing_address: Option<Address>,
    shipping_method: Option<ShippingMethod>,

    status: OrderStatus,
    payment_status: PaymentStatus,
    payment_provider: Option<PaymentProvider>,
    payment_reference: Option<String>,
    paid_at: Option<DateTime<Utc>>,

    status_history: Vec<StatusChange>,

    #[serde(default)]
    fulfillment: Fulfillment,

    failure_reason: Option<String>,
    failed_at: Option<DateTime<Utc>>,

    #[serde(default)]
    refunds: Vec<Refund>,

    #[serde(default)]
    stock_anomalies: Vec<StockAnomaly>,

    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,

    /// Current version for optimistic concurrency. Owned by the store.
    #[serde(default)]
    version: u64,
}

impl Order {
    /// Creates a draft order from a cart snapshot.
    pub fn draft(
        owner_id: UserId,
        checkout_session_id: CheckoutSessionId,
        items: Vec<LineItem>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }

        let now = Utc::now();
        Ok(Self {
            id: OrderId::new(),
            checkout_session_id: Some(checkout_session_id),
            owner_id,
            items,
            pricing: None,
            shipping_address: None,
            billing_address: None,
            shipping_method: None,
            status: OrderStatus::Draft,
            payment_status: PaymentStatus::Uninitiated,
            payment_provider: None,
            payment_reference: None,
            paid_at: None,
            status_history: vec![StatusChange {
                from: None,
                to: OrderStatus::Draft,
                at: now,
                actor: Some(Actor::customer(owner_id)),
                note: Some("Checkout session created from cart".to_string()),
            }],
            fulfillment: Fulfillment::default(),
            failure_reason: None,
            failed_at: None,
            refunds: Vec::new(),
            stock_anomalies: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn checkout_session_id(&self) -> Option<&CheckoutSessionId> {
        self.checkout_session_id.as_ref()
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn pricing(&self) -> Option<&Pricing> {
        self.pricing.as_ref()
    }

    pub fn shipping_address(&self) -> Option<&Address> {
        self.shipping_address.as_ref()
    }

    pub fn billing_address(&self) -> Option<&Address> {
        self.billing_address.as_ref()
    }

    pub fn shipping_method(&self) -> Option<&ShippingMethod> {
        self.shipping_method.as_ref()
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    pub fn payment_provider(&self) -> Option<PaymentProvider> {
        self.payment_provider
    }

    pub fn payment_reference(&self) -> Option<&str> {
        self.payment_reference.as_deref()
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn status_history(&self) -> &[StatusChange] {
        &self.status_history
    }

    pub fn fulfillment(&self) -> &Fulfillment {
        &self.fulfillment
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn failed_at(&self) -> Option<DateTime<Utc>> {
        self.failed_at
    }

    pub fn refunds(&self) -> &[Refund] {
        &self.refunds
    }

    pub fn stock_anomalies(&self) -> &[StockAnomaly] {
        &self.stock_anomalies
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Items subtotal of the snapshot, whether or not the order is priced yet.
    pub fn subtotal(&self) -> Money {
        crate::pricing::items_subtotal(&self.items)
    }

    /// Grand total, zero until priced.
    pub fn grand_total(&self) -> Money {
        self.pricing
            .as_ref()
            .map(|pricing| pricing.grand_total)
            .unwrap_or_default()
    }

    /// Amount that can still be refunded.
    pub fn refundable_balance(&self) -> Money {
        let refunded: Money = self.refunds.iter().map(|refund| refund.amount).sum();
        self.grand_total() - refunded
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// State machine
impl Order {
    /// Moves the order from `from` to `to` and appends a history entry.
    ///
    /// Fails if the order is no longer at `from`, if the edge is not in the
    /// graph, or if `to` is `cancelled` and the actor is not an admin.
    pub fn transition(
        &mut self,
        from: OrderStatus,
        to: OrderStatus,
        actor: Option<Actor>,
        note: Option<String>,
    ) -> Result<(), OrderError> {
        if self.status != from || !from.can_transition_to(to) {
            return Err(OrderError::invalid_transition(self.status, to));
        }

        if to == OrderStatus::Cancelled && !actor.is_some_and(|actor| actor.is_admin()) {
            return Err(OrderError::AdminOnly { to });
        }

        let at = Utc::now();
        self.status = to;
        self.updated_at = at;
        self.status_history.push(StatusChange {
            from: Some(from),
            to,
            at,
            actor,
            note,
        });
        Ok(())
    }

    /// Stores the final price breakdown and moves `draft -> priced`.
    pub fn apply_pricing(
        &mut self,
        pricing: Pricing,
        shipping_address: Address,
        billing_address: Option<Address>,
        shipping_method: ShippingMethod,
        actor: Option<Actor>,
    ) -> Result<(), OrderError> {
        self.transition(
            OrderStatus::Draft,
            OrderStatus::Priced,
            actor,
            Some("Pricing finalized".to_string()),
        )?;

        self.billing_address = Some(billing_address.unwrap_or_else(|| shipping_address.clone()));
        self.shipping_address = Some(shipping_address);
        self.shipping_method = Some(shipping_method);
        self.pricing = Some(pricing);
        Ok(())
    }

    /// Records the chosen provider and moves `priced -> payment_pending`.
    pub fn begin_payment(
        &mut self,
        provider: PaymentProvider,
        actor: Option<Actor>,
    ) -> Result<(), OrderError> {
        self.transition(
            OrderStatus::Priced,
            OrderStatus::PaymentPending,
            actor,
            Some(format!("Payment initiated via {provider}")),
        )?;

        self.payment_provider = Some(provider);
        self.payment_status = PaymentStatus::Pending;
        Ok(())
    }

    /// Records the reference returned by the gateway when its session was created.
    pub fn attach_gateway_reference(
        &mut self,
        reference: impl Into<String>,
    ) -> Result<(), OrderError> {
        if self.status != OrderStatus::PaymentPending {
            return Err(OrderError::invalid_transition(
                self.status,
                OrderStatus::PaymentPending,
            ));
        }

        self.payment_reference = Some(reference.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Confirms payment. Returns `false` if the order was already paid.
    pub fn mark_paid(
        &mut self,
        provider: PaymentProvider,
        reference: impl Into<String>,
    ) -> Result<bool, OrderError> {
        if self.payment_status == PaymentStatus::Paid {
            return Ok(false);
        }

        self.transition(
            OrderStatus::PaymentPending,
            OrderStatus::Paid,
            None,
            Some(format!("Payment confirmed via {provider}")),
        )?;

        self.payment_status = PaymentStatus::Paid;
        self.payment_provider = Some(provider);
        self.payment_reference = Some(reference.into());
        self.paid_at = Some(self.updated_at);
        Ok(true)
    }

    /// Records a payment failure. Returns `false` if the order was already
    /// paid or already failed.
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<bool, OrderError> {
        if self.payment_status == PaymentStatus::Paid || self.status == OrderStatus::Failed {
            return Ok(false);
        }

        let reason = reason.into();
        self.transition(
            self.status,
            OrderStatus::Failed,
            None,
            Some(reason.clone()),
        )?;

        self.payment_status = PaymentStatus::Failed;
        self.failure_reason = Some(reason);
        self.failed_at = Some(self.updated_at);
        Ok(true)
    }

    /// Merges a fulfillment patch and applies the automatic transitions it
    /// implies. Returns the statuses entered, in order.
    pub fn apply_fulfillment(
        &mut self,
        patch: &FulfillmentPatch,
        actor: Option<Actor>,
    ) -> Result<Vec<OrderStatus>, OrderError> {
        self.fulfillment.merge(patch);
        self.updated_at = Utc::now();

        let mut entered = Vec::new();

        if self.status == OrderStatus::Paid && patch.tracking_id.is_some() {
            self.transition(
                OrderStatus::Paid,
                OrderStatus::Shipped,
                actor,
                Some("Tracking information added".to_string()),
            )?;
            self.fulfillment.shipped_at = Some(patch.shipped_at.unwrap_or(self.updated_at));
            entered.push(OrderStatus::Shipped);
        }

        if self.status == OrderStatus::Shipped && patch.delivered_at.is_some() {
            self.transition(
                OrderStatus::Shipped,
                OrderStatus::Delivered,
                actor,
                Some("Delivery confirmed".to_string()),
            )?;
            entered.push(OrderStatus::Delivered);
        }

        Ok(entered)
    }

    /// Admin status override. Returns `false` if the order is already at `next`.
    ///
    /// Statuses produced by checkout or by payment reconciliation cannot be
    /// set by hand.
    pub fn apply_manual_status(
        &mut self,
        next: OrderStatus,
        actor: Actor,
        note: Option<String>,
    ) -> Result<bool, OrderError> {
        if self.status == next {
            return Ok(false);
        }

        if !matches!(
            next,
            OrderStatus::Shipped | OrderStatus::Delivered | OrderStatus::Cancelled
        ) {
            return Err(OrderError::ManualTransitionNotAllowed { to: next });
        }

        self.transition(self.status, next, Some(actor), note)?;

        match next {
            OrderStatus::Shipped => {
                self.fulfillment.shipped_at.get_or_insert(self.updated_at);
            }
            OrderStatus::Delivered => {
                self.fulfillment.delivered_at.get_or_insert(self.updated_at);
            }
            _ => {}
        }

        Ok(true)
    }

    /// Validates a refund amount against the paid balance.
    pub fn check_refund(&self, amount: Money) -> Result<(), OrderError> {
        if self.payment_status != PaymentStatus::Paid {
            return Err(OrderError::NotPaid);
        }

        if !amount.is_positive() {
            return Err(OrderError::InvalidRefundAmount { amount });
        }

        let refundable = self.refundable_balance();
        if amount > refundable {
            return Err(OrderError::RefundExceedsBalance {
                requested: amount,
                refundable,
            });
        }

        Ok(())
    }

    /// Appends a refund issued by the gateway.
    pub fn record_refund(&mut self, refund: Refund) -> Result<(), OrderError> {
        self.check_refund(refund.amount)?;
        self.updated_at = refund.at;
        self.refunds.push(refund);
        Ok(())
    }

    /// Records a stock decrement that could not be applied.
    pub fn record_stock_anomaly(&mut self, product_id: ProductId, reason: impl Into<String>) {
        let at = Utc::now();
        self.updated_at = at;
        self.stock_anomalies.push(StockAnomaly {
            product_id,
            reason: reason.into(),
            at,
        });
    }
}

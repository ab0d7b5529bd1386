//! Checkout session manager: cart to draft, draft to priced, priced to
//! payment pending.

use std::sync::Arc;

use common::{CheckoutSessionId, OrderId, UserId};
use domain::{
    Actor, Address, Money, Order, OrderError, OrderStatus, PaymentProvider, Pricing,
    PricingPolicy, ShippingMethod,
};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use crate::error::{Result, ServiceError};
use crate::gateway::GatewayRegistry;
use crate::repository::OrderRepository;
use crate::shipping::ShippingQuoter;

/// Result of converting a cart into a draft order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitSession {
    pub checkout_session_id: CheckoutSessionId,
    pub order_id: OrderId,
    pub subtotal: Money,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizePricing {
    pub checkout_session_id: CheckoutSessionId,
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    pub shipping_method_id: String,
}

/// Price breakdown returned once a draft is priced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PricingSummary {
    pub order_id: OrderId,
    pub checkout_session_id: CheckoutSessionId,
    pub shipping_method: ShippingMethod,
    pub pricing: Pricing,
}

/// Gateway reference the client uses to complete payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewaySession {
    pub order_id: OrderId,
    pub provider: PaymentProvider,
    pub gateway_reference: String,
    /// Only present when the session was created by this call.
    pub client_secret: Option<String>,
    pub reused: bool,
}

/// Drives an order from the cart up to `payment_pending`.
///
/// Stock is only checked here, never reserved; the decrement happens when
/// payment is confirmed.
#[derive(Clone)]
pub struct CheckoutService<S> {
    orders: OrderRepository<S>,
    gateways: GatewayRegistry,
    quoter: Arc<dyn ShippingQuoter>,
    policy: PricingPolicy,
}

impl<S> CheckoutService<S>
where
    S: CommerceStore + Clone,
{
    pub fn new(
        store: S,
        gateways: GatewayRegistry,
        quoter: Arc<dyn ShippingQuoter>,
        policy: PricingPolicy,
    ) -> Self {
        Self {
            orders: OrderRepository::new(store),
            gateways,
            quoter,
            policy,
        }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Snapshots the caller's cart into a new draft order.
    #[tracing::instrument(skip(self))]
    pub async fn init_session(&self, user_id: UserId) -> Result<InitSession> {
        let store = self.orders.store();

        let lines = store.cart_lines(user_id).await?;
        if lines.is_empty() {
            return Err(ServiceError::EmptyCart);
        }

        let mut items = Vec::with_capacity(lines.len());
        for line in &lines {
            let product = store.get_product(&line.product_id).await?.ok_or_else(|| {
                ServiceError::ProductUnavailable {
                    product_id: line.product_id.clone(),
                }
            })?;

            let available = store.stock_level(&line.product_id).await?.unwrap_or(0);
            if line.qty > available {
                return Err(ServiceError::InsufficientStock {
                    product_id: line.product_id.clone(),
                    requested: line.qty,
                    available,
                });
            }

            items.push(product.snapshot(line.qty));
        }

        let checkout_session_id = CheckoutSessionId::generate();
        let draft = Order::draft(user_id, checkout_session_id.clone(), items)?;
        let order = store.insert_order(&draft).await?;

        metrics::counter!("checkout_sessions_created_total").increment(1);
        tracing::info!(order_id = %order.id(), %checkout_session_id, "checkout session created");

        Ok(InitSession {
            checkout_session_id,
            order_id: order.id(),
            subtotal: order.subtotal(),
        })
    }

    /// Shipping methods offered for an address.
    pub fn quote_shipping(&self, address: &Address) -> Vec<ShippingMethod> {
        self.quoter.quote(address)
    }

    /// Prices a draft and moves it to `priced`.
    #[tracing::instrument(skip(self, request), fields(checkout_session_id = %request.checkout_session_id))]
    pub async fn finalize_pricing(
        &self,
        user_id: UserId,
        request: FinalizePricing,
    ) -> Result<PricingSummary> {
        let order = self
            .find_session(user_id, &request.checkout_session_id)
            .await?;

        if order.status() != OrderStatus::Draft {
            return Err(OrderError::invalid_transition(order.status(), OrderStatus::Priced).into());
        }

        let method = self
            .quote_shipping(&request.shipping_address)
            .into_iter()
            .find(|method| method.id == request.shipping_method_id)
            .ok_or_else(|| ServiceError::UnknownShippingMethod(request.shipping_method_id.clone()))?;

        let actor = Actor::customer(user_id);
        let mutation = self
            .orders
            .execute(order.id(), |order| {
                let pricing = Pricing::compute(order.items(), &method, &self.policy);
                order.apply_pricing(
                    pricing,
                    request.shipping_address.clone(),
                    request.billing_address.clone(),
                    method.clone(),
                    Some(actor),
                )?;
                Ok(())
            })
            .await?;

        let order = mutation.order;
        let pricing = order
            .pricing()
            .cloned()
            .ok_or_else(|| OrderError::invalid_transition(order.status(), OrderStatus::Priced))?;

        tracing::info!(order_id = %order.id(), grand_total = %pricing.grand_total, "pricing finalized");

        Ok(PricingSummary {
            order_id: order.id(),
            checkout_session_id: request.checkout_session_id,
            shipping_method: method,
            pricing,
        })
    }

    /// Records the chosen provider and moves a priced order to
    /// `payment_pending`. Does not call the gateway.
    #[tracing::instrument(skip(self))]
    pub async fn prepare_payment(
        &self,
        user_id: UserId,
        checkout_session_id: &CheckoutSessionId,
        provider: PaymentProvider,
    ) -> Result<Order> {
        let order = self.find_session(user_id, checkout_session_id).await?;

        if !self.gateways.contains(provider) {
            return Err(ServiceError::UnknownGateway(provider));
        }

        let actor = Actor::customer(user_id);
        let mutation = self
            .orders
            .execute(order.id(), |order| {
                order.begin_payment(provider, Some(actor))?;
                Ok(())
            })
            .await?;

        Ok(mutation.order)
    }

    /// Returns the gateway reference for a `payment_pending` order, creating
    /// the gateway session on first use.
    #[tracing::instrument(skip(self))]
    pub async fn start_gateway_session(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<GatewaySession> {
        let order = self.load_owned(user_id, order_id).await?;

        if order.status() != OrderStatus::PaymentPending {
            return Err(
                OrderError::invalid_transition(order.status(), OrderStatus::PaymentPending).into(),
            );
        }

        let provider = order.payment_provider().ok_or_else(|| {
            OrderError::invalid_transition(order.status(), OrderStatus::PaymentPending)
        })?;

        if let Some(reference) = order.payment_reference() {
            return Ok(GatewaySession {
                order_id,
                provider,
                gateway_reference: reference.to_string(),
                client_secret: None,
                reused: true,
            });
        }

        let gateway = self
            .gateways
            .get(provider)
            .ok_or(ServiceError::UnknownGateway(provider))?;
        let session = gateway.create_payment_session(&order).await.inspect_err(|e| {
            tracing::warn!(%order_id, %provider, error = %e, "gateway session creation failed");
        })?;

        // A concurrent call may have recorded its own reference first; keep it.
        let mutation = self
            .orders
            .execute(order_id, |order| {
                if let Some(existing) = order.payment_reference() {
                    return Ok(existing.to_string());
                }
                order.attach_gateway_reference(session.gateway_reference.clone())?;
                Ok(session.gateway_reference.clone())
            })
            .await?;

        let reused = mutation.value != session.gateway_reference;
        Ok(GatewaySession {
            order_id,
            provider,
            gateway_reference: mutation.value,
            client_secret: (!reused).then_some(session.client_secret),
            reused,
        })
    }

    /// Loads an order, hiding orders that belong to someone else.
    pub async fn load_owned(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self.orders.load(order_id).await?;
        if order.owner_id() != user_id {
            return Err(ServiceError::OrderNotFound(order_id));
        }
        Ok(order)
    }

    async fn find_session(
        &self,
        user_id: UserId,
        checkout_session_id: &CheckoutSessionId,
    ) -> Result<Order> {
        self.orders
            .store()
            .find_order_by_session(user_id, checkout_session_id)
            .await?
            .ok_or_else(|| ServiceError::SessionNotFound(checkout_session_id.clone()))
    }
}

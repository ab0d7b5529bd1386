//! Payment gateway capability and its adapters.

pub mod memory;
pub mod razorpay;
pub mod signature;
pub mod stripe;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{Money, Order, PaymentProvider};
use thiserror::Error;

pub use memory::InMemoryGateway;
pub use razorpay::{RazorpayConfig, RazorpayGateway};
pub use stripe::{StripeConfig, StripeGateway};

/// Errors from outbound gateway calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The HTTP request could not be completed.
    #[error("Gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with an error status.
    #[error("Gateway rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The gateway answered with something we could not read.
    #[error("Unexpected gateway response: {0}")]
    InvalidResponse(String),

    /// The gateway is not reachable.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
}

/// Why an inbound webhook was not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("Missing signature header")]
    MissingHeader,

    #[error("Malformed signature header")]
    MalformedHeader,

    #[error("Signature mismatch")]
    Mismatch,

    #[error("Signature timestamp outside tolerance ({age_secs}s)")]
    Expired { age_secs: i64 },

    /// Signed correctly but not a payload we can read.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Reference returned when a gateway session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentSession {
    /// Gateway-side identifier; idempotency key for reconciliation.
    pub gateway_reference: String,

    /// What the client needs to complete payment (hosted URL or public key).
    pub client_secret: String,
}

/// A verified inbound event, reduced to what reconciliation needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    PaymentSucceeded {
        order_id: OrderId,
        gateway_reference: String,
    },
    PaymentFailed {
        order_id: OrderId,
        reason: String,
    },
    /// Authentic, but of no interest to reconciliation.
    Ignored { event_type: String },
    /// Authentic payment event that names no order of ours, such as a
    /// capture made outside checkout.
    Unroutable { event_type: String, reason: String },
}

impl GatewayEvent {
    pub(crate) fn unroutable(event_type: &str, reason: impl Into<String>) -> Self {
        Self::Unroutable {
            event_type: event_type.to_string(),
            reason: reason.into(),
        }
    }

    /// Builds an order event from the order id in gateway metadata, or
    /// `Unroutable` when the id is missing or unreadable.
    pub(crate) fn for_order(
        event_type: &str,
        raw_order_id: Option<&str>,
        build: impl FnOnce(OrderId) -> Self,
    ) -> Self {
        match parse_order_id(raw_order_id) {
            Ok(order_id) => build(order_id),
            Err(reason) => Self::unroutable(event_type, reason),
        }
    }
}

/// Capability interface to an external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The provider this adapter talks to.
    fn provider(&self) -> PaymentProvider;

    /// Name of the HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Creates a payment session or gateway order for a priced order.
    async fn create_payment_session(&self, order: &Order) -> Result<PaymentSession, GatewayError>;

    /// Authenticates a raw webhook body and decodes it.
    fn verify_inbound_signature(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<GatewayEvent, SignatureError>;

    /// Refunds part or all of a captured payment. Returns the refund id.
    async fn refund(&self, gateway_reference: &str, amount: Money) -> Result<String, GatewayError>;
}

/// Maps each provider to its adapter.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own provider, replacing any previous one.
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.provider(), gateway);
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&provider).cloned()
    }

    pub fn contains(&self, provider: PaymentProvider) -> bool {
        self.gateways.contains_key(&provider)
    }

    pub fn providers(&self) -> Vec<PaymentProvider> {
        let mut providers: Vec<_> = self.gateways.keys().copied().collect();
        providers.sort_by_key(|provider| provider.as_str());
        providers
    }

    pub fn is_empty(&self) -> bool {
        self.gateways.is_empty()
    }
}

/// Parses an order id carried in gateway metadata.
fn parse_order_id(raw: Option<&str>) -> Result<OrderId, String> {
    let raw = raw.ok_or_else(|| "missing order id".to_string())?;
    OrderId::parse(raw).map_err(|_| format!("invalid order id: {raw}"))
}

/// Reads an error body from a failed gateway response.
pub(crate) async fn rejection(response: reqwest::Response) -> GatewayError {
    let status = response.status().as_u16();
    let message = response
        .text()
        .await
        .unwrap_or_else(|e| format!("unreadable body: {e}"));
    GatewayError::Rejected { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_routes_by_provider() {
        let registry = GatewayRegistry::new()
            .with(Arc::new(InMemoryGateway::new(PaymentProvider::Stripe, "s")))
            .with(Arc::new(InMemoryGateway::new(PaymentProvider::Razorpay, "r")));

        assert_eq!(
            registry.providers(),
            vec![PaymentProvider::Razorpay, PaymentProvider::Stripe]
        );
        assert_eq!(
            registry.get(PaymentProvider::Razorpay).map(|g| g.provider()),
            Some(PaymentProvider::Razorpay)
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = GatewayRegistry::new();
        assert!(registry.is_empty());
        assert!(!registry.contains(PaymentProvider::Stripe));
        assert!(registry.get(PaymentProvider::Stripe).is_none());
    }

    #[test]
    fn test_parse_order_id() {
        let id = OrderId::new();
        assert_eq!(parse_order_id(Some(&id.to_string())), Ok(id));
        assert_eq!(parse_order_id(None), Err("missing order id".to_string()));
        assert!(parse_order_id(Some("not-a-uuid")).is_err());
    }

    #[test]
    fn test_event_without_order_is_unroutable() {
        let id = OrderId::new();
        let failed = |order_id: OrderId| GatewayEvent::PaymentFailed {
            order_id,
            reason: "declined".to_string(),
        };

        assert_eq!(
            GatewayEvent::for_order("payment.failed", Some(&id.to_string()), failed),
            failed(id)
        );
        assert_eq!(
            GatewayEvent::for_order("payment.failed", None, failed),
            GatewayEvent::Unroutable {
                event_type: "payment.failed".to_string(),
                reason: "missing order id".to_string(),
            }
        );
        assert!(matches!(
            GatewayEvent::for_order("payment.failed", Some("order_9"), failed),
            GatewayEvent::Unroutable { .. }
        ));
    }
}

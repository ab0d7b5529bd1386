//! Deterministic gateway for tests and local runs.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::OrderId;
use domain::{Money, Order, PaymentProvider};
use serde_json::{Value, json};

use super::{
    GatewayError, GatewayEvent, PaymentGateway, PaymentSession, SignatureError, signature,
};

pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    sessions: HashMap<String, OrderId>,
    refunds: Vec<(String, String, Money)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_refund: bool,
}

/// In-memory payment gateway.
///
/// Webhooks are JSON bodies signed with a hex HMAC-SHA256 of the body:
/// `{"type": "payment.succeeded" | "payment.failed", "orderId", "reference", "reason"}`.
#[derive(Debug, Clone)]
pub struct InMemoryGateway {
    provider: PaymentProvider,
    secret: String,
    state: Arc<Mutex<InMemoryGatewayState>>,
}

impl InMemoryGateway {
    /// Creates a gateway that registers under `provider`.
    pub fn new(provider: PaymentProvider, secret: impl Into<String>) -> Self {
        Self {
            provider,
            secret: secret.into(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, InMemoryGatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures the gateway to fail session creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.state().fail_on_create = fail;
    }

    /// Configures the gateway to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state().fail_on_refund = fail;
    }

    /// Returns the number of sessions created.
    pub fn session_count(&self) -> usize {
        self.state().sessions.len()
    }

    /// Returns the refunds issued, as `(refund_id, reference, amount)`.
    pub fn refunds(&self) -> Vec<(String, String, Money)> {
        self.state().refunds.clone()
    }

    /// Signs a body the way inbound webhooks are signed.
    pub fn sign(&self, body: &[u8]) -> String {
        signature::sign_hex(&self.secret, &[body]).unwrap_or_default()
    }

    /// Body of a payment-succeeded webhook.
    pub fn succeeded_event(order_id: OrderId, reference: &str) -> Vec<u8> {
        json!({
            "type": "payment.succeeded",
            "orderId": order_id.to_string(),
            "reference": reference,
        })
        .to_string()
        .into_bytes()
    }

    /// Body of a payment-failed webhook.
    pub fn failed_event(order_id: OrderId, reason: &str) -> Vec<u8> {
        json!({
            "type": "payment.failed",
            "orderId": order_id.to_string(),
            "reason": reason,
        })
        .to_string()
        .into_bytes()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryGateway {
    fn provider(&self) -> PaymentProvider {
        self.provider
    }

    fn signature_header(&self) -> &'static str {
        SIGNATURE_HEADER
    }

    async fn create_payment_session(&self, order: &Order) -> Result<PaymentSession, GatewayError> {
        let mut state = self.state();

        if state.fail_on_create {
            return Err(GatewayError::Unavailable("Gateway offline".to_string()));
        }

        state.next_id += 1;
        let gateway_reference = format!("{}_sess_{:04}", self.provider, state.next_id);
        state.sessions.insert(gateway_reference.clone(), order.id());

        Ok(PaymentSession {
            client_secret: format!("{gateway_reference}_secret"),
            gateway_reference,
        })
    }

    fn verify_inbound_signature(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<GatewayEvent, SignatureError> {
        let signature = signature.ok_or(SignatureError::MissingHeader)?;
        signature::verify_hex(&self.secret, &[raw_payload], signature)?;

        let event: Value = serde_json::from_slice(raw_payload)
            .map_err(|e| SignatureError::MalformedPayload(e.to_string()))?;

        let order_id = event["orderId"].as_str();
        match event["type"].as_str().unwrap_or_default() {
            event_type @ "payment.succeeded" => {
                Ok(GatewayEvent::for_order(event_type, order_id, |order_id| {
                    GatewayEvent::PaymentSucceeded {
                        order_id,
                        gateway_reference: event["reference"]
                            .as_str()
                            .unwrap_or_default()
                            .to_string(),
                    }
                }))
            }
            event_type @ "payment.failed" => {
                Ok(GatewayEvent::for_order(event_type, order_id, |order_id| {
                    GatewayEvent::PaymentFailed {
                        order_id,
                        reason: event["reason"]
                            .as_str()
                            .unwrap_or("payment_failed")
                            .to_string(),
                    }
                }))
            }
            other => Ok(GatewayEvent::Ignored {
                event_type: other.to_string(),
            }),
        }
    }

    async fn refund(&self, gateway_reference: &str, amount: Money) -> Result<String, GatewayError> {
        let mut state = self.state();

        if state.fail_on_refund {
            return Err(GatewayError::Unavailable("Refund declined".to_string()));
        }

        state.next_id += 1;
        let refund_id = format!("rfnd_{:04}", state.next_id);
        state
            .refunds
            .push((refund_id.clone(), gateway_reference.to_string(), amount));

        Ok(refund_id)
    }
}

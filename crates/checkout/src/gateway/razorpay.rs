//! Razorpay Orders adapter via the REST API.

use std::time::Duration;

use async_trait::async_trait;
use domain::{Money, Order, PaymentProvider};
use serde_json::{Value, json};

use super::{
    GatewayError, GatewayEvent, PaymentGateway, PaymentSession, SignatureError, rejection,
    signature,
};

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub api_base: String,
}

impl RazorpayConfig {
    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            webhook_secret: webhook_secret.into(),
            api_base: "https://api.razorpay.com".to_string(),
        }
    }
}

pub struct RazorpayGateway {
    config: RazorpayConfig,
    client: reqwest::Client,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Order id from the payment's notes, then the order's notes, then the receipt.
    fn order_id_of(payment: &Value, order: &Value) -> Option<String> {
        payment["notes"]["orderId"]
            .as_str()
            .or_else(|| order["notes"]["orderId"].as_str())
            .or_else(|| order["receipt"].as_str())
            .map(String::from)
    }

    fn decode_event(raw_payload: &[u8]) -> Result<GatewayEvent, SignatureError> {
        let event: Value = serde_json::from_slice(raw_payload)
            .map_err(|e| SignatureError::MalformedPayload(e.to_string()))?;
        let event_type = event["event"].as_str().unwrap_or_default();
        let payment = &event["payload"]["payment"]["entity"];
        let order = &event["payload"]["order"]["entity"];

        match event_type {
            "payment.captured" | "order.paid" => {
                let Some(gateway_reference) = payment["id"].as_str().or_else(|| order["id"].as_str())
                else {
                    return Ok(GatewayEvent::unroutable(event_type, "missing payment reference"));
                };
                Ok(GatewayEvent::for_order(
                    event_type,
                    Self::order_id_of(payment, order).as_deref(),
                    |order_id| GatewayEvent::PaymentSucceeded {
                        order_id,
                        gateway_reference: gateway_reference.to_string(),
                    },
                ))
            }
            "payment.failed" => {
                let reason = payment["error_description"]
                    .as_str()
                    .unwrap_or("payment_failed");
                Ok(GatewayEvent::for_order(
                    event_type,
                    Self::order_id_of(payment, order).as_deref(),
                    |order_id| GatewayEvent::PaymentFailed {
                        order_id,
                        reason: reason.to_string(),
                    },
                ))
            }
            other => Ok(GatewayEvent::Ignored {
                event_type: other.to_string(),
            }),
        }
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Razorpay
    }

    fn signature_header(&self) -> &'static str {
        "x-razorpay-signature"
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn create_payment_session(&self, order: &Order) -> Result<PaymentSession, GatewayError> {
        let order_id = order.id().to_string();
        let currency = order
            .pricing()
            .map(|pricing| pricing.currency.to_ascii_uppercase())
            .unwrap_or_else(|| "INR".to_string());

        let response = self
            .client
            .post(format!("{}/v1/orders", self.config.api_base))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&json!({
                "amount": order.grand_total().cents(),
                "currency": currency,
                "receipt": order_id,
                "notes": { "orderId": order_id },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body: Value = response.json().await?;
        let gateway_reference = body["id"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidResponse(format!("order without id: {body}")))?;

        Ok(PaymentSession {
            gateway_reference: gateway_reference.to_string(),
            client_secret: self.config.key_id.clone(),
        })
    }

    fn verify_inbound_signature(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<GatewayEvent, SignatureError> {
        let signature = signature.ok_or(SignatureError::MissingHeader)?;
        signature::verify_hex(&self.config.webhook_secret, &[raw_payload], signature)?;
        Self::decode_event(raw_payload)
    }

    #[tracing::instrument(skip(self))]
    async fn refund(&self, gateway_reference: &str, amount: Money) -> Result<String, GatewayError> {
        let response = self
            .client
            .post(format!(
                "{}/v1/payments/{gateway_reference}/refund",
                self.config.api_base
            ))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&json!({ "amount": amount.cents() }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body: Value = response.json().await?;
        body["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| GatewayError::InvalidResponse(format!("refund without id: {body}")))
    }
}

#[cfg(test)]
mod tests {
    use common::OrderId;

    use super::*;

    const SECRET: &str = "rzp_webhook_secret";

    fn gateway() -> RazorpayGateway {
        RazorpayGateway::new(RazorpayConfig::new("rzp_test_key", "rzp_key_secret", SECRET))
    }

    fn captured(order_id: OrderId) -> Vec<u8> {
        json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": {
                "id": "pay_29QQoUBi66xm2f",
                "order_id": "order_9A33XWu170gUtm",
                "notes": { "orderId": order_id.to_string() }
            }}}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_valid_signature_decodes_capture() {
        let order_id = OrderId::new();
        let payload = captured(order_id);
        let sig = signature::sign_hex(SECRET, &[payload.as_slice()]).unwrap();

        let event = gateway()
            .verify_inbound_signature(&payload, Some(&sig))
            .unwrap();

        assert_eq!(
            event,
            GatewayEvent::PaymentSucceeded {
                order_id,
                gateway_reference: "pay_29QQoUBi66xm2f".to_string(),
            }
        );
    }

    #[test]
    fn test_tampered_body_rejected() {
        let payload = captured(OrderId::new());
        let sig = signature::sign_hex(SECRET, &[payload.as_slice()]).unwrap();
        let tampered = captured(OrderId::new());

        assert_eq!(
            gateway().verify_inbound_signature(&tampered, Some(&sig)),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            gateway().verify_inbound_signature(&payload, None),
            Err(SignatureError::MissingHeader)
        );
    }

    #[test]
    fn test_order_paid_falls_back_to_receipt() {
        let order_id = OrderId::new();
        let payload = json!({
            "event": "order.paid",
            "payload": {
                "payment": { "entity": { "id": "pay_1" } },
                "order": { "entity": { "id": "order_1", "receipt": order_id.to_string() } }
            }
        })
        .to_string();

        assert_eq!(
            RazorpayGateway::decode_event(payload.as_bytes()),
            Ok(GatewayEvent::PaymentSucceeded {
                order_id,
                gateway_reference: "pay_1".to_string(),
            })
        );
    }

    #[test]
    fn test_payment_failed_reason() {
        let order_id = OrderId::new();
        let payload = json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": {
                "id": "pay_1",
                "notes": { "orderId": order_id.to_string() },
                "error_description": "Payment was unsuccessful"
            }}}
        })
        .to_string();

        assert_eq!(
            RazorpayGateway::decode_event(payload.as_bytes()),
            Ok(GatewayEvent::PaymentFailed {
                order_id,
                reason: "Payment was unsuccessful".to_string(),
            })
        );
    }

    #[test]
    fn test_capture_outside_checkout_is_unroutable() {
        let payload = json!({
            "event": "payment.captured",
            "payload": {
                "payment": { "entity": { "id": "pay_ext", "notes": {} } },
                "order": { "entity": { "id": "order_ext" } }
            }
        })
        .to_string()
        .into_bytes();
        let sig = signature::sign_hex(SECRET, &[payload.as_slice()]).unwrap();

        assert_eq!(
            gateway().verify_inbound_signature(&payload, Some(&sig)),
            Ok(GatewayEvent::Unroutable {
                event_type: "payment.captured".to_string(),
                reason: "missing order id".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_event_ignored() {
        let payload = json!({ "event": "refund.processed", "payload": {} }).to_string();
        assert!(matches!(
            RazorpayGateway::decode_event(payload.as_bytes()),
            Ok(GatewayEvent::Ignored { .. })
        ));
    }
}

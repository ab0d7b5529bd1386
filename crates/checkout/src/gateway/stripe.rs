//! Stripe Checkout adapter via the REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use domain::{Money, Order, PaymentProvider};
use serde_json::Value;

use super::{
    GatewayError, GatewayEvent, PaymentGateway, PaymentSession, SignatureError, rejection,
    signature,
};

/// Webhooks older than this are rejected as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Base URL the hosted checkout returns the customer to.
    pub frontend_url: String,
    pub api_base: String,
}

impl StripeConfig {
    pub fn new(
        secret_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            secret_key: secret_key.into(),
            webhook_secret: webhook_secret.into(),
            frontend_url: frontend_url.into(),
            api_base: "https://api.stripe.com".to_string(),
        }
    }
}

pub struct StripeGateway {
    config: StripeConfig,
    client: reqwest::Client,
}

impl StripeGateway {
    pub fn new(config: StripeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Splits `t=<unix>,v1=<hex>[,v1=<hex>...]`.
    fn parse_header(header: &str) -> Result<(&str, Vec<&str>), SignatureError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(v) = part.strip_prefix("v1=") {
                signatures.push(v);
            }
        }

        match timestamp {
            Some(t) if !signatures.is_empty() => Ok((t, signatures)),
            _ => Err(SignatureError::MalformedHeader),
        }
    }

    fn decode_event(raw_payload: &[u8]) -> Result<GatewayEvent, SignatureError> {
        let event: Value = serde_json::from_slice(raw_payload)
            .map_err(|e| SignatureError::MalformedPayload(e.to_string()))?;
        let event_type = event["type"].as_str().unwrap_or_default();
        let object = &event["data"]["object"];

        match event_type {
            "checkout.session.completed" if object["payment_status"].as_str() == Some("unpaid") => {
                // Delayed payment methods confirm later via async_payment_succeeded
                Ok(GatewayEvent::Ignored {
                    event_type: event_type.to_string(),
                })
            }
            "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                let Some(gateway_reference) = object["payment_intent"]
                    .as_str()
                    .or_else(|| object["id"].as_str())
                else {
                    return Ok(GatewayEvent::unroutable(event_type, "missing payment reference"));
                };
                Ok(GatewayEvent::for_order(
                    event_type,
                    object["metadata"]["orderId"].as_str(),
                    |order_id| GatewayEvent::PaymentSucceeded {
                        order_id,
                        gateway_reference: gateway_reference.to_string(),
                    },
                ))
            }
            "checkout.session.async_payment_failed" | "payment_intent.payment_failed" => {
                let reason = object["last_payment_error"]["message"]
                    .as_str()
                    .unwrap_or("payment_failed");
                Ok(GatewayEvent::for_order(
                    event_type,
                    object["metadata"]["orderId"].as_str(),
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
impl PaymentGateway for StripeGateway {
    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    async fn create_payment_session(&self, order: &Order) -> Result<PaymentSession, GatewayError> {
        let order_id = order.id().to_string();
        let currency = order
            .pricing()
            .map(|pricing| pricing.currency.to_ascii_lowercase())
            .unwrap_or_else(|| "inr".to_string());
        let frontend = self.config.frontend_url.trim_end_matches('/');

        let form = [
            ("mode", "payment".to_string()),
            ("payment_method_types[0]", "card".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", currency),
            (
                "line_items[0][price_data][unit_amount]",
                order.grand_total().cents().to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                format!("Order {order_id}"),
            ),
            (
                "success_url",
                format!("{frontend}/checkout/success?order={order_id}"),
            ),
            ("cancel_url", format!("{frontend}/checkout?order={order_id}")),
            ("client_reference_id", order_id.clone()),
            ("metadata[orderId]", order_id.clone()),
            ("payment_intent_data[metadata][orderId]", order_id),
        ];

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.api_base))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response).await);
        }

        let body: Value = response.json().await?;
        let gateway_reference = body["id"]
            .as_str()
            .ok_or_else(|| GatewayError::InvalidResponse(format!("session without id: {body}")))?;
        let url = body["url"].as_str().unwrap_or_default();

        Ok(PaymentSession {
            gateway_reference: gateway_reference.to_string(),
            client_secret: url.to_string(),
        })
    }

    fn verify_inbound_signature(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<GatewayEvent, SignatureError> {
        let header = signature.ok_or(SignatureError::MissingHeader)?;
        let (timestamp, candidates) = Self::parse_header(header)?;

        let parts: [&[u8]; 3] = [timestamp.as_bytes(), b".", raw_payload];
        let verified = candidates.iter().any(|candidate| {
            signature::verify_hex(&self.config.webhook_secret, &parts, candidate).is_ok()
        });
        if !verified {
            return Err(SignatureError::Mismatch);
        }

        let ts: i64 = timestamp
            .parse()
            .map_err(|_| SignatureError::MalformedHeader)?;
        let age_secs = Utc::now().timestamp() - ts;
        if age_secs.abs() > SIGNATURE_TOLERANCE_SECS {
            return Err(SignatureError::Expired { age_secs });
        }

        Self::decode_event(raw_payload)
    }

    #[tracing::instrument(skip(self))]
    async fn refund(&self, gateway_reference: &str, amount: Money) -> Result<String, GatewayError> {
        let form = [
            ("payment_intent", gateway_reference.to_string()),
            ("amount", amount.cents().to_string()),
        ];

        let response = self
            .client
            .post(format!("{}/v1/refunds", self.config.api_base))
            .basic_auth(&self.config.secret_key, None::<&str>)
            .form(&form)
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
    use serde_json::json;

    use super::*;

    const SECRET: &str = "whsec_test123secret456";

    fn gateway() -> StripeGateway {
        StripeGateway::new(StripeConfig::new("sk_test_xxx", SECRET, "http://localhost:5173"))
    }

    fn signed_header(payload: &[u8], timestamp: i64, secret: &str) -> String {
        let ts = timestamp.to_string();
        let sig = signature::sign_hex(secret, &[ts.as_bytes(), b".", payload]).unwrap();
        format!("t={ts},v1={sig}")
    }

    fn completed(order_id: OrderId) -> Vec<u8> {
        json!({
            "id": "evt_1",
            "type": "checkout.session.completed",
            "data": { "object": {
                "id": "cs_test_1",
                "payment_intent": "pi_123",
                "payment_status": "paid",
                "metadata": { "orderId": order_id.to_string() }
            }}
        })
        .to_string()
        .into_bytes()
    }

    #[test]
    fn test_valid_signature_decodes_success() {
        let order_id = OrderId::new();
        let payload = completed(order_id);
        let header = signed_header(&payload, Utc::now().timestamp(), SECRET);

        let event = gateway()
            .verify_inbound_signature(&payload, Some(&header))
            .unwrap();

        assert_eq!(
            event,
            GatewayEvent::PaymentSucceeded {
                order_id,
                gateway_reference: "pi_123".to_string(),
            }
        );
    }

    #[test]
    fn test_any_v1_signature_may_match() {
        let payload = completed(OrderId::new());
        let ts = Utc::now().timestamp();
        let good = signed_header(&payload, ts, SECRET);
        let sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={ts},v1=deadbeef,v1={sig}");

        assert!(gateway().verify_inbound_signature(&payload, Some(&header)).is_ok());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = completed(OrderId::new());
        let header = signed_header(&payload, Utc::now().timestamp(), "wrong_secret");

        assert_eq!(
            gateway().verify_inbound_signature(&payload, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = completed(OrderId::new());
        let header = signed_header(&payload, Utc::now().timestamp(), SECRET);
        let tampered = completed(OrderId::new());

        assert_eq!(
            gateway().verify_inbound_signature(&tampered, Some(&header)),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_old_timestamp_rejected() {
        let payload = completed(OrderId::new());
        let header = signed_header(&payload, Utc::now().timestamp() - 600, SECRET);

        assert!(matches!(
            gateway().verify_inbound_signature(&payload, Some(&header)),
            Err(SignatureError::Expired { .. })
        ));
    }

    #[test]
    fn test_missing_or_malformed_header() {
        let payload = completed(OrderId::new());
        let gateway = gateway();

        assert_eq!(
            gateway.verify_inbound_signature(&payload, None),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            gateway.verify_inbound_signature(&payload, Some("v1=abc")),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn test_payment_failed_event() {
        let order_id = OrderId::new();
        let payload = json!({
            "type": "payment_intent.payment_failed",
            "data": { "object": {
                "id": "pi_123",
                "metadata": { "orderId": order_id.to_string() },
                "last_payment_error": { "message": "Your card was declined." }
            }}
        })
        .to_string();

        let event = StripeGateway::decode_event(payload.as_bytes()).unwrap();
        assert_eq!(
            event,
            GatewayEvent::PaymentFailed {
                order_id,
                reason: "Your card was declined.".to_string(),
            }
        );
    }

    #[test]
    fn test_failure_without_order_metadata_is_unroutable() {
        let payload = json!({
            "type": "payment_intent.payment_failed",
            "data": { "object": { "id": "pi_ext", "metadata": {} } }
        })
        .to_string()
        .into_bytes();
        let header = signed_header(&payload, Utc::now().timestamp(), SECRET);

        assert!(matches!(
            gateway().verify_inbound_signature(&payload, Some(&header)),
            Ok(GatewayEvent::Unroutable { .. })
        ));
    }

    #[test]
    fn test_unpaid_completion_and_unknown_types_are_ignored() {
        let unpaid = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "id": "cs_1", "payment_status": "unpaid" } }
        })
        .to_string();
        let other = json!({ "type": "customer.created", "data": { "object": {} } }).to_string();

        assert!(matches!(
            StripeGateway::decode_event(unpaid.as_bytes()),
            Ok(GatewayEvent::Ignored { .. })
        ));
        assert_eq!(
            StripeGateway::decode_event(other.as_bytes()),
            Ok(GatewayEvent::Ignored {
                event_type: "customer.created".to_string()
            })
        );
    }
}

//! Inbound gateway webhooks.

use common::OrderId;
use domain::{OrderError, PaymentProvider};
use store::CommerceStore;
use thiserror::Error;

use crate::error::ServiceError;
use crate::gateway::{GatewayEvent, GatewayRegistry, SignatureError};
use crate::reconciliation::ReconciliationService;

/// What a verified webhook did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Paid { order_id: OrderId },
    Failed { order_id: OrderId },
    /// Authentic event of a type reconciliation does not handle.
    Ignored { event_type: String },
    /// Authentic event that could not be applied, typically a replay
    /// against an order that has moved on.
    Acknowledged { order_id: OrderId, reason: String },
    /// Authentic payment event that names no order of ours.
    Unroutable { event_type: String, reason: String },
}

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("No gateway configured for {0}")]
    UnknownProvider(PaymentProvider),

    /// The request is not from the gateway. Nothing was touched.
    #[error("Webhook rejected: {0}")]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Verifies webhook bodies and routes them to reconciliation.
#[derive(Clone)]
pub struct WebhookProcessor<S> {
    gateways: GatewayRegistry,
    reconciliation: ReconciliationService<S>,
}

impl<S> WebhookProcessor<S>
where
    S: CommerceStore + Clone,
{
    pub fn new(gateways: GatewayRegistry, reconciliation: ReconciliationService<S>) -> Self {
        Self {
            gateways,
            reconciliation,
        }
    }

    /// Header the provider signs its webhooks in.
    pub fn signature_header(&self, provider: PaymentProvider) -> Result<&'static str, WebhookError> {
        self.gateways
            .get(provider)
            .map(|gateway| gateway.signature_header())
            .ok_or(WebhookError::UnknownProvider(provider))
    }

    #[tracing::instrument(skip(self, raw_payload, signature), fields(bytes = raw_payload.len()))]
    pub async fn process(
        &self,
        provider: PaymentProvider,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, WebhookError> {
        let gateway = self
            .gateways
            .get(provider)
            .ok_or(WebhookError::UnknownProvider(provider))?;

        let event = gateway
            .verify_inbound_signature(raw_payload, signature)
            .inspect_err(|e| {
                tracing::warn!(%provider, error = %e, "webhook signature rejected");
                metrics::counter!("webhook_signature_rejections_total", "provider" => provider.as_str())
                    .increment(1);
            })?;

        metrics::counter!("webhooks_received_total", "provider" => provider.as_str()).increment(1);

        let (order_id, result) = match event {
            GatewayEvent::PaymentSucceeded {
                order_id,
                gateway_reference,
            } => (
                order_id,
                self.reconciliation
                    .mark_paid(order_id, provider, &gateway_reference)
                    .await
                    .map(|_| WebhookOutcome::Paid { order_id }),
            ),
            GatewayEvent::PaymentFailed { order_id, reason } => (
                order_id,
                self.reconciliation
                    .mark_failed(order_id, &reason)
                    .await
                    .map(|_| WebhookOutcome::Failed { order_id }),
            ),
            GatewayEvent::Ignored { event_type } => {
                tracing::debug!(%provider, event_type = %event_type, "webhook event ignored");
                return Ok(WebhookOutcome::Ignored { event_type });
            }
            GatewayEvent::Unroutable { event_type, reason } => {
                tracing::info!(%provider, event_type = %event_type, %reason, "webhook acknowledged without an order");
                metrics::counter!("webhooks_unroutable_total", "provider" => provider.as_str())
                    .increment(1);
                return Ok(WebhookOutcome::Unroutable { event_type, reason });
            }
        };

        match result {
            Ok(outcome) => Ok(outcome),
            Err(
                e @ (ServiceError::OrderNotFound(_)
                | ServiceError::Order(OrderError::InvalidStateTransition { .. })),
            ) => {
                tracing::info!(%order_id, %provider, reason = %e, "webhook acknowledged without change");
                Ok(WebhookOutcome::Acknowledged {
                    order_id,
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

//! Customer checkout endpoints: cart to draft, pricing, payment hand-off.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use checkout::{FinalizePricing, GatewaySession, InitSession, PricingSummary};
use common::{CheckoutSessionId, OrderId};
use domain::{Address, Order, PaymentProvider, ShippingMethod};
use serde::{Deserialize, Serialize};
use store::CommerceStore;

use super::JsonBody;
use crate::error::ApiError;
use crate::identity::Caller;
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingQuoteRequest {
    pub shipping_address: Address,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparePaymentRequest {
    pub checkout_session_id: CheckoutSessionId,
    pub gateway: PaymentProvider,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionRequest {
    pub order_id: OrderId,
}

// -- Response types --

#[derive(Serialize)]
pub struct ShippingQuoteResponse {
    pub methods: Vec<ShippingMethod>,
}

// -- Handlers --

/// POST /checkout/init-session
#[tracing::instrument(skip(state, caller), fields(user_id = %caller.user_id()))]
pub async fn init_session<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
) -> Result<(StatusCode, Json<InitSession>), ApiError> {
    let session = state.checkout.init_session(caller.user_id()).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

/// POST /checkout/shipping-quote
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.user_id()))]
pub async fn shipping_quote<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<ShippingQuoteRequest>,
) -> Json<ShippingQuoteResponse> {
    let methods = state.checkout.quote_shipping(&req.shipping_address);
    tracing::debug!(methods = methods.len(), "shipping quoted");
    Json(ShippingQuoteResponse { methods })
}

/// POST /checkout/finalize-pricing
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.user_id()))]
pub async fn finalize_pricing<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<FinalizePricing>,
) -> Result<Json<PricingSummary>, ApiError> {
    let summary = state
        .checkout
        .finalize_pricing(caller.user_id(), req)
        .await?;
    Ok(Json(summary))
}

/// POST /checkout/prepare-payment
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.user_id(), gateway = %req.gateway))]
pub async fn prepare_payment<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<PreparePaymentRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .checkout
        .prepare_payment(caller.user_id(), &req.checkout_session_id, req.gateway)
        .await?;
    Ok(Json(order))
}

/// POST /checkout/payment-session
#[tracing::instrument(skip(state, caller, req), fields(user_id = %caller.user_id(), order_id = %req.order_id))]
pub async fn payment_session<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    caller: Caller,
    JsonBody(req): JsonBody<PaymentSessionRequest>,
) -> Result<Json<GatewaySession>, ApiError> {
    let session = state
        .checkout
        .start_gateway_session(caller.user_id(), req.order_id)
        .await?;
    Ok(Json(session))
}

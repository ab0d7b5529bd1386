//! Admin order endpoints. Every handler requires the admin role.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use checkout::ServiceError;
use domain::{FulfillmentPatch, Money, Order, OrderStatus};
use serde::Deserialize;
use store::{CommerceStore, OrderStore};

use super::{JsonBody, parse_order_id};
use crate::error::ApiError;
use crate::identity::AdminCaller;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateFulfillmentRequest {
    pub fulfillment: FulfillmentPatch,
}

#[derive(Deserialize)]
pub struct RefundRequest {
    /// Minor currency units.
    pub amount: Money,
    #[serde(default)]
    pub reason: Option<String>,
}

/// GET /admin/orders/{id}
pub async fn get<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    _admin: AdminCaller,
    Path(id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .store
        .get_order(order_id)
        .await
        .map_err(ServiceError::from)?
        .ok_or(ServiceError::OrderNotFound(order_id))?;
    Ok(Json(order))
}

/// PUT /admin/orders/{id}/status
#[tracing::instrument(skip(state, admin, req), fields(actor_id = %admin.0.id, status = %req.status))]
pub async fn update_status<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminCaller,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateStatusRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .fulfillment
        .update_status(order_id, req.status, admin.0, req.note)
        .await?;
    Ok(Json(order))
}

/// PUT /admin/orders/{id}/fulfillment
#[tracing::instrument(skip(state, admin, req), fields(actor_id = %admin.0.id))]
pub async fn update_fulfillment<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminCaller,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateFulfillmentRequest>,
) -> Result<Json<Order>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .fulfillment
        .update_fulfillment(order_id, req.fulfillment, Some(admin.0))
        .await?;
    Ok(Json(order))
}

/// POST /admin/orders/{id}/refunds
#[tracing::instrument(skip(state, admin, req), fields(actor_id = %admin.0.id, amount = %req.amount))]
pub async fn refund<S: CommerceStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    admin: AdminCaller,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<RefundRequest>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state
        .reconciliation
        .refund(order_id, req.amount, req.reason, admin.0)
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

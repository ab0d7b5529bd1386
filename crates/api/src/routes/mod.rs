//! HTTP route handlers.

pub mod admin;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod webhooks;

use axum::Json;
use axum::extract::{FromRequest, Request};
use common::OrderId;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// JSON request body whose rejections use the API error shape.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(JsonBody(value))
    }
}

/// Parses an order id path segment.
pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|_| ApiError::BadRequest(format!("Invalid order ID: {id}")))
}

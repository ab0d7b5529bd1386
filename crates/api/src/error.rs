//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{ServiceError, WebhookError};
use domain::OrderError;
use store::StoreError;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
///
/// Bodies are `{"error": CODE, "message": text}`. Internal failures carry a
/// generic message; the detail only goes to the log.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),

    /// Missing or malformed caller identity.
    #[error("Authentication required")]
    Unauthorized,

    /// The caller is not an admin.
    #[error("Admin access required")]
    Forbidden,

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// Checkout, reconciliation or fulfillment failure.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Webhook rejection or processing failure.
    #[error(transparent)]
    Webhook(#[from] WebhookError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            err @ ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string()),
            err @ ApiError::Forbidden => (StatusCode::FORBIDDEN, "FORBIDDEN", err.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::Service(err) => service_error_to_response(err),
            ApiError::Webhook(err) => webhook_error_to_response(err),
        };

        metrics::counter!("api_errors_total", "code" => code).increment(1);

        let body = serde_json::json!({ "error": code, "message": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(err: &dyn std::fmt::Display) -> (StatusCode, &'static str, String) {
    tracing::error!(error = %err, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "Internal server error".to_string(),
    )
}

fn order_error_to_response(err: OrderError) -> (StatusCode, &'static str, String) {
    let (status, code) = match &err {
        OrderError::InvalidStateTransition { .. } => {
            (StatusCode::CONFLICT, "INVALID_STATE_TRANSITION")
        }
        OrderError::NotPaid => (StatusCode::CONFLICT, "ORDER_NOT_PAID"),
        OrderError::AdminOnly { .. } => (StatusCode::FORBIDDEN, "ADMIN_ONLY"),
        OrderError::NoItems => (StatusCode::BAD_REQUEST, "NO_ITEMS"),
        OrderError::ManualTransitionNotAllowed { .. } => {
            (StatusCode::BAD_REQUEST, "MANUAL_TRANSITION_NOT_ALLOWED")
        }
        OrderError::InvalidRefundAmount { .. } => {
            (StatusCode::BAD_REQUEST, "INVALID_REFUND_AMOUNT")
        }
        OrderError::RefundExceedsBalance { .. } => {
            (StatusCode::BAD_REQUEST, "REFUND_EXCEEDS_BALANCE")
        }
    };
    (status, code, err.to_string())
}

fn service_error_to_response(err: ServiceError) -> (StatusCode, &'static str, String) {
    let (status, code) = match err {
        ServiceError::Order(order_err) => return order_error_to_response(order_err),
        ServiceError::Store(ref store_err) => return store_error_to_response(store_err),
        ServiceError::GatewayUnavailable(ref e) => {
            tracing::warn!(error = %e, "payment gateway call failed");
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                "GATEWAY_UNAVAILABLE",
                "Payment gateway unavailable".to_string(),
            );
        }
        ServiceError::EmptyCart => (StatusCode::BAD_REQUEST, "EMPTY_CART"),
        ServiceError::ProductUnavailable { .. } => (StatusCode::BAD_REQUEST, "PRODUCT_UNAVAILABLE"),
        ServiceError::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, "INSUFFICIENT_STOCK"),
        ServiceError::UnknownShippingMethod(_) => {
            (StatusCode::BAD_REQUEST, "UNKNOWN_SHIPPING_METHOD")
        }
        ServiceError::UnknownGateway(_) => (StatusCode::BAD_REQUEST, "UNKNOWN_GATEWAY"),
        ServiceError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
        ServiceError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND"),
        ServiceError::ConcurrencyConflict(_) => (StatusCode::CONFLICT, "CONCURRENT_MODIFICATION"),
    };
    (status, code, err.to_string())
}

fn store_error_to_response(err: &StoreError) -> (StatusCode, &'static str, String) {
    match err {
        StoreError::OrderNotFound(_) => (StatusCode::NOT_FOUND, "ORDER_NOT_FOUND", err.to_string()),
        StoreError::ConcurrencyConflict { .. } => (
            StatusCode::CONFLICT,
            "CONCURRENT_MODIFICATION",
            err.to_string(),
        ),
        StoreError::DuplicateCheckoutSession(_) => (
            StatusCode::CONFLICT,
            "DUPLICATE_CHECKOUT_SESSION",
            err.to_string(),
        ),
        _ => internal(err),
    }
}

fn webhook_error_to_response(err: WebhookError) -> (StatusCode, &'static str, String) {
    match err {
        WebhookError::UnknownProvider(provider) => (
            StatusCode::NOT_FOUND,
            "UNKNOWN_PROVIDER",
            format!("No webhook endpoint for {provider}"),
        ),
        WebhookError::Signature(_) => (
            StatusCode::BAD_REQUEST,
            "INVALID_SIGNATURE",
            "Invalid webhook signature".to_string(),
        ),
        WebhookError::Service(e) => {
            tracing::error!(error = %e, "webhook processing failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "WEBHOOK_PROCESSING_FAILED",
                "Webhook processing failed".to_string(),
            )
        }
    }
}

//! Checkout service error types.

use common::{CheckoutSessionId, OrderId, ProductId};
use domain::{OrderError, PaymentProvider};
use store::StoreError;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors that can occur during checkout and reconciliation operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The user's cart has no lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A cart line references a product that is not in the catalog.
    #[error("Product unavailable: {product_id}")]
    ProductUnavailable { product_id: ProductId },

    /// A cart line asks for more than is in stock.
    #[error("Insufficient stock for {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// No order exists for this checkout session and user.
    #[error("Checkout session not found: {0}")]
    SessionNotFound(CheckoutSessionId),

    /// The order does not exist or is not visible to the caller.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The shipping method id is not offered for the address.
    #[error("Unknown shipping method: {0}")]
    UnknownShippingMethod(String),

    /// No gateway is registered for the provider.
    #[error("Payment gateway not configured: {0}")]
    UnknownGateway(PaymentProvider),

    /// The payment gateway could not complete the call.
    #[error("Payment gateway unavailable: {0}")]
    GatewayUnavailable(#[from] GatewayError),

    /// The order kept changing underneath us.
    #[error("Order {0} was modified concurrently, retries exhausted")]
    ConcurrencyConflict(OrderId),

    /// The order rejected the operation.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for service results.
pub type Result<T> = std::result::Result<T, ServiceError>;

//! Order aggregate and related types.

mod aggregate;
mod history;
mod state;
mod value_objects;

pub use aggregate::Order;
pub use history::{Actor, ActorRole, StatusChange};
pub use state::{OrderStatus, PaymentStatus};
pub use value_objects::{
    Address, Fulfillment, FulfillmentPatch, LineItem, Money, PaymentProvider, Refund,
    StockAnomaly,
};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The order is not in the expected state, or the edge is not in the graph.
    #[error("Invalid state transition: cannot move to {attempted} from {current} state")]
    InvalidStateTransition {
        current: OrderStatus,
        attempted: OrderStatus,
    },

    /// An order must be created with at least one line.
    #[error("Order has no items")]
    NoItems,

    /// The transition requires an admin actor.
    #[error("Only an admin can move an order to {to}")]
    AdminOnly { to: OrderStatus },

    /// Only payment reconciliation may produce this status.
    #[error("Status {to} can only be set by payment reconciliation")]
    ManualTransitionNotAllowed { to: OrderStatus },

    /// The order has not been paid.
    #[error("Order has not been paid")]
    NotPaid,

    /// Refund amounts must be positive.
    #[error("Invalid refund amount: {amount} (must be greater than 0)")]
    InvalidRefundAmount { amount: Money },

    /// Refunds may not exceed what was collected.
    #[error("Refund of {requested} exceeds refundable balance of {refundable}")]
    RefundExceedsBalance { requested: Money, refundable: Money },
}

impl OrderError {
    /// Convenience constructor for the most common rejection.
    pub fn invalid_transition(current: OrderStatus, attempted: OrderStatus) -> Self {
        OrderError::InvalidStateTransition { current, attempted }
    }
}

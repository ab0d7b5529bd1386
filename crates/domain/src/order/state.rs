//! Order state machine.

use serde::{Deserialize, Serialize};

/// Fulfillment status of an order.
///
/// State transitions:
/// ```text
/// Draft ──► Priced ──► PaymentPending ──► Paid ──► Shipped ──► Delivered
///   │         │  │           │
///   │         │  └───────────┴──► Failed
///   └─────────┴──────────────┴──► Cancelled (admin only)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created from a cart; not yet priced.
    #[default]
    Draft,

    /// Shipping and tax computed; awaiting a payment provider choice.
    Priced,

    /// Handed off to a gateway; waiting for confirmation.
    PaymentPending,

    /// Payment confirmed by the gateway.
    Paid,

    /// Handed to the carrier.
    Shipped,

    /// Received by the customer (terminal state).
    Delivered,

    /// Payment failed (terminal state).
    Failed,

    /// Cancelled by an admin (terminal state).
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Draft,
        OrderStatus::Priced,
        OrderStatus::PaymentPending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Failed,
        OrderStatus::Cancelled,
    ];

    /// Returns true if `next` is a legal edge from this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Draft, Priced)
                | (Priced, PaymentPending)
                | (PaymentPending, Paid)
                | (Paid, Shipped)
                | (Shipped, Delivered)
                | (Priced | PaymentPending, Failed)
                | (Draft | Priced | PaymentPending, Cancelled)
        )
    }

    /// Returns true if the order can be cancelled in this state.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(OrderStatus::Cancelled)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Failed | OrderStatus::Cancelled
        )
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "draft",
            OrderStatus::Priced => "priced",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Failed => "failed",
            OrderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

/// Payment sub-state, tracked independently of fulfillment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Uninitiated,
    Pending,
    Paid,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Uninitiated => "uninitiated",
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_draft() {
        assert_eq!(OrderStatus::default(), OrderStatus::Draft);
        assert_eq!(PaymentStatus::default(), PaymentStatus::Uninitiated);
    }

    #[test]
    fn test_happy_path_edges() {
        assert!(OrderStatus::Draft.can_transition_to(OrderStatus::Priced));
        assert!(OrderStatus::Priced.can_transition_to(OrderStatus::PaymentPending));
        assert!(OrderStatus::PaymentPending.can_transition_to(OrderStatus::Paid));
        assert!(OrderStatus::Paid.can_transition_to(OrderStatus::Shipped));
        assert!(OrderStatus::Shipped.can_transition_to(OrderStatus::Delivered));
    }

    #[test]
    fn test_failure_edges() {
        assert!(OrderStatus::Priced.can_transition_to(OrderStatus::Failed));
        assert!(OrderStatus::PaymentPending.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Draft.can_transition_to(OrderStatus::Failed));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::Failed));
    }

    #[test]
    fn test_can_cancel_only_before_payment() {
        assert!(OrderStatus::Draft.can_cancel());
        assert!(OrderStatus::Priced.can_cancel());
        assert!(OrderStatus::PaymentPending.can_cancel());
        assert!(!OrderStatus::Paid.can_cancel());
        assert!(!OrderStatus::Shipped.can_cancel());
        assert!(!OrderStatus::Failed.can_cancel());
    }

    #[test]
    fn test_no_backward_edges() {
        assert!(!OrderStatus::Priced.can_transition_to(OrderStatus::Draft));
        assert!(!OrderStatus::Paid.can_transition_to(OrderStatus::PaymentPending));
        assert!(!OrderStatus::Delivered.can_transition_to(OrderStatus::Shipped));
        assert!(!OrderStatus::Failed.can_transition_to(OrderStatus::PaymentPending));
    }

    #[test]
    fn test_terminal_states_have_no_edges() {
        for terminal in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            for next in OrderStatus::ALL {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }
    }

    #[test]
    fn test_no_self_edges() {
        for status in OrderStatus::ALL {
            assert!(!status.can_transition_to(status));
        }
    }

    #[test]
    fn test_display_and_parse_agree() {
        for status in OrderStatus::ALL {
            assert_eq!(status.to_string().parse::<OrderStatus>(), Ok(status));
        }
        assert!("pending".parse::<OrderStatus>().is_err());
    }

    #[test]
    fn test_serialization_uses_snake_case() {
        let json = serde_json::to_string(&OrderStatus::PaymentPending).unwrap();
        assert_eq!(json, "\"payment_pending\"");
        let deserialized: OrderStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, OrderStatus::PaymentPending);
    }
}

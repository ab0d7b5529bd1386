//! Status history entries, the audit trail of record.

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use super::OrderStatus;

/// Role of whoever triggered a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorRole {
    Customer,
    Admin,
}

/// The user that triggered a transition. System-driven transitions
/// (webhooks, fulfillment automation) have no actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: UserId,
    pub role: ActorRole,
}

impl Actor {
    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::Admin,
        }
    }

    pub fn customer(id: UserId) -> Self {
        Self {
            id,
            role: ActorRole::Customer,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }
}

/// One entry of an order's append-only status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// `None` only for the entry that records draft creation.
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub at: DateTime<Utc>,
    pub actor: Option<Actor>,
    pub note: Option<String>,
}

//! Identifier types shared by every crate in the workspace.

mod ids;

pub use ids::{CheckoutSessionId, OrderId, ProductId, UserId};

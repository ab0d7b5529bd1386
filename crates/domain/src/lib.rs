//! Domain layer for the checkout reconciliation engine.
//!
//! This crate provides the pure core, with no I/O:
//! - Order aggregate with the status state machine and audit history
//! - Pricing: items subtotal, shipping surcharges, tax and grand total
//! - Catalog and cart records read by checkout

pub mod catalog;
pub mod order;
pub mod pricing;

pub use catalog::{CartLine, Product};
pub use order::{
    Actor, ActorRole, Address, Fulfillment, FulfillmentPatch, LineItem, Money, Order, OrderError,
    OrderStatus, PaymentProvider, PaymentStatus, Refund, StatusChange, StockAnomaly,
};
pub use pricing::{Pricing, PricingPolicy, ShippingMethod};

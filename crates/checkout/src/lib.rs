//! Checkout and payment reconciliation services.
//!
//! - [`CheckoutService`]: cart to draft order, pricing, payment hand-off
//! - [`ReconciliationService`]: idempotent mark-paid / mark-failed and refunds
//! - [`WebhookProcessor`]: signature verification in front of reconciliation
//! - [`FulfillmentService`]: tracking updates and admin status overrides
//!
//! Every order write goes through [`OrderRepository`], which reloads and
//! retries on a version conflict.

pub mod error;
pub mod fulfillment;
pub mod gateway;
pub mod notifications;
pub mod reconciliation;
pub mod repository;
pub mod session;
pub mod shipping;
pub mod webhook;

pub use error::{Result, ServiceError};
pub use fulfillment::FulfillmentService;
pub use gateway::{
    GatewayError, GatewayEvent, GatewayRegistry, InMemoryGateway, PaymentGateway, PaymentSession,
    RazorpayConfig, RazorpayGateway, SignatureError, StripeConfig, StripeGateway,
};
pub use notifications::{
    InMemoryNotifier, Notification, NotificationDispatcher, NotificationKind, QueueNotifier,
};
pub use reconciliation::ReconciliationService;
pub use repository::{Mutation, OrderRepository};
pub use session::{CheckoutService, FinalizePricing, GatewaySession, InitSession, PricingSummary};
pub use shipping::{RateTableQuoter, ShippingQuoter};
pub use webhook::{WebhookError, WebhookOutcome, WebhookProcessor};

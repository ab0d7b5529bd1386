//! HTTP API for the checkout reconciliation engine.
//!
//! Customer checkout, gateway webhooks and admin order endpoints, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use checkout::{GatewayRegistry, InMemoryGateway, RazorpayGateway, StripeGateway};
use domain::PaymentProvider;
use metrics_exporter_prometheus::PrometheusHandle;
use store::CommerceStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
pub use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: CommerceStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/checkout/init-session",
            post(routes::checkout::init_session::<S>),
        )
        .route(
            "/checkout/shipping-quote",
            post(routes::checkout::shipping_quote::<S>),
        )
        .route(
            "/checkout/finalize-pricing",
            post(routes::checkout::finalize_pricing::<S>),
        )
        .route(
            "/checkout/prepare-payment",
            post(routes::checkout::prepare_payment::<S>),
        )
        .route(
            "/checkout/payment-session",
            post(routes::checkout::payment_session::<S>),
        )
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/webhooks/{provider}", post(routes::webhooks::receive::<S>))
        .route("/admin/orders/{id}", get(routes::admin::get::<S>))
        .route(
            "/admin/orders/{id}/status",
            put(routes::admin::update_status::<S>),
        )
        .route(
            "/admin/orders/{id}/fulfillment",
            put(routes::admin::update_fulfillment::<S>),
        )
        .route(
            "/admin/orders/{id}/refunds",
            post(routes::admin::refund::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Registers a gateway for every provider whose credentials are configured.
///
/// With `DEV_GATEWAY_SECRET` set, providers left without credentials get an
/// in-process gateway signing with that secret.
pub fn build_gateways(config: &Config) -> GatewayRegistry {
    let mut gateways = GatewayRegistry::new();

    if let Some(stripe) = config.stripe() {
        gateways.register(Arc::new(StripeGateway::new(stripe)));
    }
    if let Some(razorpay) = config.razorpay() {
        gateways.register(Arc::new(RazorpayGateway::new(razorpay)));
    }

    if let Some(secret) = &config.dev_gateway_secret {
        for provider in [PaymentProvider::Stripe, PaymentProvider::Razorpay] {
            if !gateways.contains(provider) {
                tracing::warn!(%provider, "using in-process development gateway");
                gateways.register(Arc::new(InMemoryGateway::new(provider, secret.clone())));
            }
        }
    }

    gateways
}

#[cfg(test)]
mod tests {
    use checkout::PaymentGateway;

    use super::*;

    #[test]
    fn test_no_credentials_no_gateways() {
        let gateways = build_gateways(&Config::default());
        assert!(gateways.is_empty());
    }

    #[test]
    fn test_dev_gateway_fills_missing_providers() {
        let config = Config {
            stripe_secret_key: Some("sk_test".to_string()),
            stripe_webhook_secret: Some("whsec".to_string()),
            dev_gateway_secret: Some("dev".to_string()),
            ..Config::default()
        };

        let gateways = build_gateways(&config);

        assert!(gateways.contains(PaymentProvider::Stripe));
        assert!(gateways.contains(PaymentProvider::Razorpay));
        assert_eq!(
            gateways
                .get(PaymentProvider::Stripe)
                .map(|g| g.signature_header()),
            Some("stripe-signature")
        );
    }
}

//! Shared application state.

use std::sync::Arc;

use checkout::{
    CheckoutService, FulfillmentService, GatewayRegistry, NotificationDispatcher,
    RateTableQuoter, ReconciliationService, WebhookProcessor,
};
use domain::PricingPolicy;
use store::CommerceStore;

/// Services shared by all handlers.
pub struct AppState<S> {
    pub store: S,
    pub checkout: CheckoutService<S>,
    pub reconciliation: ReconciliationService<S>,
    pub fulfillment: FulfillmentService<S>,
    pub webhooks: WebhookProcessor<S>,
}

impl<S> AppState<S>
where
    S: CommerceStore + Clone,
{
    /// Wires every service over one store, gateway set and notifier.
    pub fn new(
        store: S,
        gateways: GatewayRegistry,
        notifier: Arc<dyn NotificationDispatcher>,
        policy: PricingPolicy,
    ) -> Self {
        let checkout = CheckoutService::new(
            store.clone(),
            gateways.clone(),
            Arc::new(RateTableQuoter::new()),
            policy,
        );
        let reconciliation =
            ReconciliationService::new(store.clone(), gateways.clone(), notifier.clone());
        let fulfillment = FulfillmentService::new(store.clone(), notifier);
        let webhooks = WebhookProcessor::new(gateways, reconciliation.clone());

        Self {
            store,
            checkout,
            reconciliation,
            fulfillment,
            webhooks,
        }
    }
}

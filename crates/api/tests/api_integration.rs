//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use checkout::{GatewayRegistry, InMemoryGateway, InMemoryNotifier, NotificationKind};
use common::{ProductId, UserId};
use domain::{CartLine, Money, PaymentProvider, PricingPolicy, Product};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{InMemoryStore, StockLedger};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

struct TestHarness {
    app: Router,
    store: InMemoryStore,
    gateway: InMemoryGateway,
    notifier: InMemoryNotifier,
    user: UserId,
}

impl TestHarness {
    /// Product P at 100 with 5 in stock; the user's cart holds 2 of it.
    async fn new() -> Self {
        let store = InMemoryStore::new();
        let gateway = InMemoryGateway::new(PaymentProvider::Stripe, "whsec_test");
        let notifier = InMemoryNotifier::new();
        let gateways = GatewayRegistry::new().with(Arc::new(gateway.clone()));

        store
            .upsert_product(
                Product {
                    id: ProductId::new("P"),
                    title: "Desk Lamp".to_string(),
                    price: Money::from_cents(100),
                    image_ref: String::new(),
                    sku: "LAMP-01".to_string(),
                    weight_grams: 0,
                },
                5,
            )
            .await;
        let user = UserId::new();
        store.add_to_cart(user, CartLine::new("P", 2)).await;

        let state = Arc::new(AppState::new(
            store.clone(),
            gateways,
            Arc::new(notifier.clone()),
            PricingPolicy::default(),
        ));
        let app = api::create_app(state, get_metrics_handle());

        Self {
            app,
            store,
            gateway,
            notifier,
            user,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    fn request(method: &str, uri: &str, user: UserId, role: &str, body: Option<Value>) -> Request<Body> {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("x-user-id", user.to_string())
            .header("x-user-role", role);
        match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn customer(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(Self::request(method, uri, self.user, "customer", body))
            .await
    }

    async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.send(Self::request(method, uri, UserId::new(), "admin", body))
            .await
    }

    async fn webhook(&self, body: Vec<u8>, signature: &str) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/webhooks/stripe")
                .header("content-type", "application/json")
                .header(checkout::gateway::memory::SIGNATURE_HEADER, signature)
                .body(Body::from(body))
                .unwrap(),
        )
        .await
    }

    fn address() -> Value {
        json!({
            "fullName": "Ravi Kumar",
            "phone": "9999999999",
            "email": "ravi@example.com",
            "addressLine1": "12 MG Road",
            "city": "Pune",
            "state": "Maharashtra",
            "postalCode": "411001",
            "country": "India"
        })
    }

    /// Walks the cart through to `payment_pending` and returns the order id.
    async fn pending_order(&self) -> String {
        let (status, session) = self
            .customer("POST", "/checkout/init-session", None)
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let session_id = session["checkoutSessionId"].clone();

        let (status, _) = self
            .customer(
                "POST",
                "/checkout/finalize-pricing",
                Some(json!({
                    "checkoutSessionId": session_id,
                    "shippingAddress": Self::address(),
                    "shippingMethodId": "standard"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, order) = self
            .customer(
                "POST",
                "/checkout/prepare-payment",
                Some(json!({ "checkoutSessionId": session_id, "gateway": "stripe" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(order["status"], "payment_pending");

        session["orderId"].as_str().unwrap().to_string()
    }

    async fn stock(&self) -> Option<u32> {
        self.store.stock_level(&ProductId::new("P")).await.unwrap()
    }
}

#[tokio::test]
async fn test_health_check() {
    let h = TestHarness::new().await;

    let (status, body) = h
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let h = TestHarness::new().await;

    let response = h
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_checkout_to_paid_via_webhook() {
    let h = TestHarness::new().await;

    let (status, quote) = h
        .customer(
            "POST",
            "/checkout/shipping-quote",
            Some(json!({ "shippingAddress": TestHarness::address() })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = quote["methods"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"standard"));

    let order_id = h.pending_order().await;

    let (status, session) = h
        .customer(
            "POST",
            "/checkout/payment-session",
            Some(json!({ "orderId": order_id })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["reused"], false);
    let reference = session["gatewayReference"].as_str().unwrap().to_string();

    let order_uuid = common::OrderId::parse(&order_id).unwrap();
    let body = InMemoryGateway::succeeded_event(order_uuid, &reference);
    let signature = h.gateway.sign(&body);
    let (status, ack) = h.webhook(body.clone(), &signature).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "paid");

    // Replay is acknowledged and changes nothing
    let (status, _) = h.webhook(body, &signature).await;
    assert_eq!(status, StatusCode::OK);

    let (status, order) = h
        .customer("GET", &format!("/orders/{order_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "paid");
    assert_eq!(order["paymentStatus"], "paid");
    assert_eq!(order["pricing"]["grandTotal"], 286);
    assert_eq!(order["paymentReference"], reference.as_str());

    assert_eq!(h.stock().await, Some(3));
    assert_eq!(h.notifier.count(NotificationKind::OrderPaid), 1);
}

#[tokio::test]
async fn test_tampered_webhook_is_rejected() {
    let h = TestHarness::new().await;
    let order_id = h.pending_order().await;
    let order_uuid = common::OrderId::parse(&order_id).unwrap();

    let signed = InMemoryGateway::succeeded_event(order_uuid, "pi_real");
    let tampered = InMemoryGateway::succeeded_event(order_uuid, "pi_forged");
    let (status, body) = h.webhook(tampered, &h.gateway.sign(&signed)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "INVALID_SIGNATURE");

    let (_, order) = h
        .customer("GET", &format!("/orders/{order_id}"), None)
        .await;
    assert_eq!(order["status"], "payment_pending");
    assert_eq!(order["statusHistory"].as_array().unwrap().len(), 3);
    assert_eq!(h.stock().await, Some(5));
}

#[tokio::test]
async fn test_signed_webhook_without_order_is_acknowledged() {
    let h = TestHarness::new().await;
    let order_id = h.pending_order().await;

    let body = br#"{"type":"payment.failed","reason":"declined"}"#.to_vec();
    let signature = h.gateway.sign(&body);
    let (status, ack) = h.webhook(body, &signature).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["received"], true);
    assert_eq!(ack["outcome"], "acknowledged");

    let (_, order) = h
        .customer("GET", &format!("/orders/{order_id}"), None)
        .await;
    assert_eq!(order["status"], "payment_pending");
    assert_eq!(h.stock().await, Some(5));
}

#[tokio::test]
async fn test_webhook_without_signature() {
    let h = TestHarness::new().await;
    let order_uuid = common::OrderId::new();

    let (status, _) = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/webhooks/stripe")
                .body(Body::from(InMemoryGateway::succeeded_event(order_uuid, "pi")))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_webhook_unknown_provider() {
    let h = TestHarness::new().await;

    for provider in ["paypal", "razorpay"] {
        let (status, _) = h
            .send(
                Request::builder()
                    .method("POST")
                    .uri(format!("/webhooks/{provider}"))
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND, "provider {provider}");
    }
}

#[tokio::test]
async fn test_empty_cart_is_rejected() {
    let h = TestHarness::new().await;
    let stranger = UserId::new();

    let (status, body) = h
        .send(TestHarness::request(
            "POST",
            "/checkout/init-session",
            stranger,
            "customer",
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "EMPTY_CART");
    assert_eq!(h.store.order_count().await, 0);
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let h = TestHarness::new().await;

    let (status, _) = h
        .send(
            Request::builder()
                .method("POST")
                .uri("/checkout/init-session")
                .body(Body::empty())
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_other_users_order_is_not_found() {
    let h = TestHarness::new().await;
    let order_id = h.pending_order().await;

    let (status, _) = h
        .send(TestHarness::request(
            "GET",
            &format!("/orders/{order_id}"),
            UserId::new(),
            "customer",
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_order_id() {
    let h = TestHarness::new().await;

    let (status, _) = h.customer("GET", "/orders/not-a-uuid", None).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let h = TestHarness::new().await;
    let order_id = h.pending_order().await;

    let (status, body) = h
        .customer(
            "PUT",
            &format!("/admin/orders/{order_id}/status"),
            Some(json!({ "status": "cancelled" })),
        )
        .await;

    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "FORBIDDEN");

    let (_, order) = h
        .customer("GET", &format!("/orders/{order_id}"), None)
        .await;
    assert_eq!(order["status"], "payment_pending");
}

#[tokio::test]
async fn test_malformed_body_uses_error_shape() {
    let h = TestHarness::new().await;
    let order_id = h.pending_order().await;

    let (status, body) = h
        .admin(
            "PUT",
            &format!("/admin/orders/{order_id}/status"),
            Some(json!({ "status": "teleported" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");
    assert!(body["message"].is_string());

    let (status, body) = h
        .customer("POST", "/checkout/shipping-quote", Some(json!({ "address": 7 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BAD_REQUEST");

    let (_, order) = h
        .customer("GET", &format!("/orders/{order_id}"), None)
        .await;
    assert_eq!(order["status"], "payment_pending");
}

#[tokio::test]
async fn test_admin_fulfillment_and_refund() {
    let h = TestHarness::new().await;
    let order_id = h.pending_order().await;
    let order_uuid = common::OrderId::parse(&order_id).unwrap();
    let body = InMemoryGateway::succeeded_event(order_uuid, "pi_1");
    let (status, _) = h.webhook(body.clone(), &h.gateway.sign(&body)).await;
    assert_eq!(status, StatusCode::OK);

    // Payment statuses are reserved for reconciliation
    let (status, body) = h
        .admin(
            "PUT",
            &format!("/admin/orders/{order_id}/status"),
            Some(json!({ "status": "payment_pending" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "MANUAL_TRANSITION_NOT_ALLOWED");

    let (status, order) = h
        .admin(
            "PUT",
            &format!("/admin/orders/{order_id}/fulfillment"),
            Some(json!({ "fulfillment": { "carrier": "LocalCourier", "trackingId": "LC123" } })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["status"], "shipped");
    assert_eq!(order["fulfillment"]["trackingId"], "LC123");

    let (status, order) = h
        .admin(
            "POST",
            &format!("/admin/orders/{order_id}/refunds"),
            Some(json!({ "amount": 86, "reason": "Damaged box" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(order["refunds"][0]["amount"], 86);

    let (status, body) = h
        .admin(
            "POST",
            &format!("/admin/orders/{order_id}/refunds"),
            Some(json!({ "amount": 500 })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "REFUND_EXCEEDS_BALANCE");

    let (status, order) = h
        .admin("GET", &format!("/admin/orders/{order_id}"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(order["refunds"].as_array().unwrap().len(), 1);
    assert_eq!(h.gateway.refunds().len(), 1);
    assert_eq!(h.notifier.count(NotificationKind::OrderShipped), 1);
}

#[tokio::test]
async fn test_gateway_outage_is_503() {
    let h = TestHarness::new().await;
    let order_id = h.pending_order().await;
    h.gateway.set_fail_on_create(true);

    let (status, body) = h
        .customer(
            "POST",
            "/checkout/payment-session",
            Some(json!({ "orderId": order_id })),
        )
        .await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "GATEWAY_UNAVAILABLE");
}

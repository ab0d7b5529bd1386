//! User-facing notifications triggered by order transitions.
//!
//! The engine only enqueues; rendering, email delivery and live push belong
//! to whoever consumes the queue.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPaid,
    OrderInvoiceEmail,
    OrderShipped,
    OrderDelivered,
    OrderCancelled,
    PaymentFailed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPaid => "order_paid",
            NotificationKind::OrderInvoiceEmail => "order_invoice_email",
            NotificationKind::OrderShipped => "order_shipped",
            NotificationKind::OrderDelivered => "order_delivered",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::PaymentFailed => "payment_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Order,
    Payment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
}

/// A notification as handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub kind: NotificationKind,
    pub entity: EntityKind,
    pub title: String,
    pub message: String,
    pub action_ref: String,
    pub priority: Priority,
}

impl Notification {
    fn about_order(
        order_id: OrderId,
        user_id: UserId,
        kind: NotificationKind,
        title: &str,
        message: &str,
        priority: Priority,
    ) -> Self {
        Self {
            order_id,
            user_id,
            kind,
            entity: EntityKind::Order,
            title: title.to_string(),
            message: message.to_string(),
            action_ref: format!("/orders/{order_id}"),
            priority,
        }
    }

    pub fn order_paid(order_id: OrderId, user_id: UserId) -> Self {
        Self::about_order(
            order_id,
            user_id,
            NotificationKind::OrderPaid,
            "Payment successful",
            "We have received your payment.",
            Priority::High,
        )
    }

    pub fn invoice_ready(order_id: OrderId, user_id: UserId) -> Self {
        Self::about_order(
            order_id,
            user_id,
            NotificationKind::OrderInvoiceEmail,
            "Your invoice is ready",
            "Please find your invoice attached to this email.",
            Priority::High,
        )
    }

    pub fn order_shipped(order_id: OrderId, user_id: UserId) -> Self {
        Self::about_order(
            order_id,
            user_id,
            NotificationKind::OrderShipped,
            "Order shipped",
            "Your order is on its way.",
            Priority::Normal,
        )
    }

    pub fn order_delivered(order_id: OrderId, user_id: UserId) -> Self {
        Self::about_order(
            order_id,
            user_id,
            NotificationKind::OrderDelivered,
            "Order delivered",
            "Your order has been delivered.",
            Priority::Normal,
        )
    }

    pub fn order_cancelled(order_id: OrderId, user_id: UserId) -> Self {
        Self::about_order(
            order_id,
            user_id,
            NotificationKind::OrderCancelled,
            "Order cancelled",
            "Your order has been cancelled.",
            Priority::High,
        )
    }

    /// Points the customer back at checkout so they can try again.
    pub fn payment_failed(order_id: OrderId, user_id: UserId) -> Self {
        Self {
            order_id,
            user_id,
            kind: NotificationKind::PaymentFailed,
            entity: EntityKind::Payment,
            title: "Payment failed".to_string(),
            message: "Your payment could not be completed. Please try again.".to_string(),
            action_ref: format!("/checkout?order={order_id}"),
            priority: Priority::High,
        }
    }

    /// Two notifications with the same key are the same user-facing event.
    pub fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{:?}:{}",
            self.user_id,
            self.kind.as_str(),
            self.entity,
            self.order_id
        )
    }
}

/// Fire-and-forget sink for notifications.
///
/// Enqueueing never fails the operation that triggered it; implementations
/// log and drop what they cannot accept.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn enqueue(&self, notification: Notification);
}

#[async_trait]
impl<T: NotificationDispatcher + ?Sized> NotificationDispatcher for Arc<T> {
    async fn enqueue(&self, notification: Notification) {
        (**self).enqueue(notification).await
    }
}

/// Records every notification it receives.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn sent(&self) -> MutexGuard<'_, Vec<Notification>> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.sent().clone()
    }

    pub fn kinds(&self) -> Vec<NotificationKind> {
        self.sent().iter().map(|n| n.kind).collect()
    }

    pub fn count(&self, kind: NotificationKind) -> usize {
        self.sent().iter().filter(|n| n.kind == kind).count()
    }
}

#[async_trait]
impl NotificationDispatcher for InMemoryNotifier {
    async fn enqueue(&self, notification: Notification) {
        self.sent().push(notification);
    }
}

/// How many recently delivered events the queue worker remembers.
pub const DEDUP_WINDOW: usize = 10_000;

/// The last `capacity` distinct keys, oldest evicted first.
#[derive(Debug)]
struct RecentKeys {
    capacity: usize,
    order: VecDeque<String>,
    seen: HashSet<String>,
}

impl RecentKeys {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            order: VecDeque::with_capacity(capacity),
            seen: HashSet::with_capacity(capacity),
        }
    }

    /// Returns `false` when the key is still in the window.
    fn insert(&mut self, key: String) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(key.clone());
        self.order.push_back(key);
        true
    }

    fn len(&self) -> usize {
        self.order.len()
    }
}

/// Hands notifications to a background worker over a bounded channel.
///
/// The worker drops repeats of a recently delivered event and logs the rest
/// for downstream delivery. Only the last [`DEDUP_WINDOW`] events are
/// remembered.
#[derive(Debug, Clone)]
pub struct QueueNotifier {
    sender: mpsc::Sender<Notification>,
}

impl QueueNotifier {
    /// Spawns the worker. It stops once every notifier clone is dropped.
    pub fn spawn(capacity: usize) -> (Self, JoinHandle<()>) {
        Self::spawn_with(capacity, DEDUP_WINDOW, None)
    }

    /// Like [`QueueNotifier::spawn`], also handing each delivered
    /// notification to `downstream`.
    pub fn spawn_forwarding(
        capacity: usize,
        downstream: Arc<dyn NotificationDispatcher>,
    ) -> (Self, JoinHandle<()>) {
        Self::spawn_with(capacity, DEDUP_WINDOW, Some(downstream))
    }

    fn spawn_with(
        capacity: usize,
        window: usize,
        downstream: Option<Arc<dyn NotificationDispatcher>>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(Self::run(receiver, RecentKeys::new(window), downstream));
        (Self { sender }, worker)
    }

    async fn run(
        mut receiver: mpsc::Receiver<Notification>,
        mut delivered: RecentKeys,
        downstream: Option<Arc<dyn NotificationDispatcher>>,
    ) {
        while let Some(notification) = receiver.recv().await {
            if !delivered.insert(notification.dedup_key()) {
                tracing::debug!(
                    order_id = %notification.order_id,
                    kind = notification.kind.as_str(),
                    "duplicate notification dropped"
                );
                metrics::counter!("notifications_deduplicated_total", "kind" => notification.kind.as_str())
                    .increment(1);
                continue;
            }

            tracing::info!(
                order_id = %notification.order_id,
                user_id = %notification.user_id,
                kind = notification.kind.as_str(),
                priority = ?notification.priority,
                title = %notification.title,
                remembered = delivered.len(),
                "notification dispatched"
            );
            metrics::counter!("notifications_dispatched_total", "kind" => notification.kind.as_str())
                .increment(1);

            if let Some(downstream) = &downstream {
                downstream.enqueue(notification).await;
            }
        }
    }
}

#[async_trait]
impl NotificationDispatcher for QueueNotifier {
    async fn enqueue(&self, notification: Notification) {
        let order_id = notification.order_id;
        if let Err(e) = self.sender.try_send(notification) {
            tracing::warn!(%order_id, error = %e, "notification queue rejected notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_failed_points_back_to_checkout() {
        let order_id = OrderId::new();
        let notification = Notification::payment_failed(order_id, UserId::new());

        assert_eq!(notification.action_ref, format!("/checkout?order={order_id}"));
        assert_eq!(notification.entity, EntityKind::Payment);
        assert_eq!(notification.priority, Priority::High);
    }

    #[test]
    fn test_order_notifications_link_to_order() {
        let order_id = OrderId::new();
        let user_id = UserId::new();

        for notification in [
            Notification::order_paid(order_id, user_id),
            Notification::invoice_ready(order_id, user_id),
            Notification::order_shipped(order_id, user_id),
            Notification::order_delivered(order_id, user_id),
            Notification::order_cancelled(order_id, user_id),
        ] {
            assert_eq!(notification.action_ref, format!("/orders/{order_id}"));
            assert_eq!(notification.entity, EntityKind::Order);
        }
    }

    #[test]
    fn test_dedup_key_distinguishes_kinds() {
        let order_id = OrderId::new();
        let user_id = UserId::new();

        assert_eq!(
            Notification::order_paid(order_id, user_id).dedup_key(),
            Notification::order_paid(order_id, user_id).dedup_key()
        );
        assert_ne!(
            Notification::order_paid(order_id, user_id).dedup_key(),
            Notification::invoice_ready(order_id, user_id).dedup_key()
        );
    }

    #[test]
    fn test_serializes_wire_names() {
        let json = serde_json::to_value(Notification::invoice_ready(OrderId::new(), UserId::new()))
            .unwrap();
        assert_eq!(json["kind"], "order_invoice_email");
        assert_eq!(json["priority"], "high");
        assert!(json.get("actionRef").is_some());
    }

    #[tokio::test]
    async fn test_in_memory_notifier_records() {
        let notifier = InMemoryNotifier::new();
        let order_id = OrderId::new();
        let user_id = UserId::new();

        notifier.enqueue(Notification::order_paid(order_id, user_id)).await;
        notifier.enqueue(Notification::invoice_ready(order_id, user_id)).await;

        assert_eq!(
            notifier.kinds(),
            vec![NotificationKind::OrderPaid, NotificationKind::OrderInvoiceEmail]
        );
        assert_eq!(notifier.count(NotificationKind::OrderPaid), 1);
    }

    #[test]
    fn test_recent_keys_evicts_oldest() {
        let mut keys = RecentKeys::new(2);

        assert!(keys.insert("a".to_string()));
        assert!(keys.insert("b".to_string()));
        assert!(!keys.insert("a".to_string()));

        assert!(keys.insert("c".to_string()));
        assert_eq!(keys.len(), 2);
        assert!(keys.insert("a".to_string()));
        assert!(!keys.insert("c".to_string()));
    }

    #[tokio::test]
    async fn test_queue_worker_drops_duplicates() {
        let downstream = InMemoryNotifier::new();
        let (notifier, worker) = QueueNotifier::spawn_forwarding(8, Arc::new(downstream.clone()));
        let order_id = OrderId::new();
        let user_id = UserId::new();

        notifier.enqueue(Notification::order_paid(order_id, user_id)).await;
        notifier.enqueue(Notification::order_paid(order_id, user_id)).await;
        notifier.enqueue(Notification::invoice_ready(order_id, user_id)).await;
        drop(notifier);
        worker.await.unwrap();

        assert_eq!(
            downstream.kinds(),
            vec![NotificationKind::OrderPaid, NotificationKind::OrderInvoiceEmail]
        );
    }

    #[tokio::test]
    async fn test_queue_worker_forgets_beyond_window() {
        let downstream = InMemoryNotifier::new();
        let (notifier, worker) =
            QueueNotifier::spawn_with(8, 1, Some(Arc::new(downstream.clone())));
        let order_id = OrderId::new();
        let user_id = UserId::new();

        notifier.enqueue(Notification::order_paid(order_id, user_id)).await;
        notifier.enqueue(Notification::order_shipped(order_id, user_id)).await;
        notifier.enqueue(Notification::order_paid(order_id, user_id)).await;
        drop(notifier);
        worker.await.unwrap();

        assert_eq!(downstream.count(NotificationKind::OrderPaid), 2);
    }

    #[tokio::test]
    async fn test_queue_worker_drains_and_stops() {
        let (notifier, worker) = QueueNotifier::spawn(8);

        notifier
            .enqueue(Notification::order_paid(OrderId::new(), UserId::new()))
            .await;
        drop(notifier);

        worker.await.unwrap();
    }
}

//! Delivery of pending outbox messages.
//!
//! Each message is delivered by loading its order and fanning the event out
//! to every audience. Audiences reached by a failed attempt are recorded on
//! the message and left out of the retries. Delivery is still at-least-once:
//! a crash between a send and its bookkeeping repeats that send.

use std::time::Duration;

use common::OrderId;
use metrics::counter;
use notification::{Audience, NotificationFanout};
use order_store::{OrderStore, OutboxMessage, OutboxStatus};
use tracing::{debug, info, warn};

use crate::worker::{WorkerHandle, spawn_periodic};
use crate::{FulfillmentSettings, Result};

/// Outcome of a relay pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayReport {
    pub delivered: usize,
    /// Failed attempts that will be retried.
    pub retrying: usize,
    /// Messages that ran out of attempts.
    pub failed: usize,
}

impl RelayReport {
    pub fn attempted(&self) -> usize {
        self.delivered + self.retrying + self.failed
    }

    fn record(&mut self, status: OutboxStatus) {
        match status {
            OutboxStatus::Delivered => self.delivered += 1,
            OutboxStatus::Pending => self.retrying += 1,
            OutboxStatus::Failed => self.failed += 1,
        }
    }
}

/// Delivers outbox messages through the notification fan-out.
#[derive(Clone)]
pub struct OutboxRelay<S> {
    store: S,
    fanout: NotificationFanout,
    max_attempts: u32,
    batch_size: usize,
}

impl<S> OutboxRelay<S>
where
    S: OrderStore + Clone + 'static,
{
    pub fn new(store: S, fanout: NotificationFanout, settings: &FulfillmentSettings) -> Self {
        Self {
            store,
            fanout,
            max_attempts: settings.outbox_max_attempts.max(1),
            batch_size: settings.outbox_batch_size.max(1),
        }
    }

    /// Delivers the pending messages of one order, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn deliver_for_order(&self, order_id: &OrderId) -> Result<RelayReport> {
        let messages = self.store.pending_outbox_for_order(order_id).await?;
        self.deliver_all(messages).await
    }

    /// Sweeps one batch of pending messages across all orders.
    #[tracing::instrument(skip(self))]
    pub async fn run_once(&self) -> Result<RelayReport> {
        let messages = self.store.pending_outbox(self.batch_size).await?;
        let report = self.deliver_all(messages).await?;
        if report.attempted() > 0 {
            info!(
                delivered = report.delivered,
                retrying = report.retrying,
                failed = report.failed,
                "Outbox sweep finished"
            );
        }
        Ok(report)
    }

    /// Sweeps the outbox every `interval` until the handle is stopped.
    pub fn spawn(self, interval: Duration) -> WorkerHandle {
        spawn_periodic("outbox_relay", interval, move || {
            let relay = self.clone();
            async move {
                if let Err(e) = relay.run_once().await {
                    tracing::error!(error = %e, "Outbox sweep failed");
                }
            }
        })
    }

    async fn deliver_all(&self, messages: Vec<OutboxMessage>) -> Result<RelayReport> {
        let mut report = RelayReport::default();
        for message in messages {
            let status = self.deliver(&message).await?;
            report.record(status);
        }
        Ok(report)
    }

    async fn deliver(&self, message: &OutboxMessage) -> Result<OutboxStatus> {
        let (error, reached) = match self.store.find_by_id(&message.order_id).await? {
            Some(order) => {
                let already: Vec<Audience> = message
                    .delivered_to
                    .iter()
                    .filter_map(|audience| audience.parse().ok())
                    .collect();
                let fanout = self
                    .fanout
                    .notify_remaining(&order, &message.event, &already)
                    .await;
                if fanout.is_complete() {
                    self.store.mark_outbox_delivered(message.id).await?;
                    counter!("outbox_delivered_total").increment(1);
                    debug!(message_id = %message.id, kind = %message.event.kind(), "Outbox message delivered");
                    return Ok(OutboxStatus::Delivered);
                }
                let reached: Vec<String> = fanout
                    .delivered
                    .iter()
                    .map(|audience| audience.as_str().to_string())
                    .collect();
                (fanout.failure_summary(), reached)
            }
            None => (format!("order {} not found", message.order_id), Vec::new()),
        };

        let status = self
            .store
            .mark_outbox_failed(message.id, &error, &reached, self.max_attempts)
            .await?;
        counter!("outbox_failed_total").increment(1);
        warn!(
            message_id = %message.id,
            order_id = %message.order_id,
            attempt = message.attempts + 1,
            %status,
            %error,
            "Outbox delivery failed"
        );
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use common::{FoodId, RestaurantId, UserId};
    use domain::{
        DeliveryAddress, FoodSnapshot, Money, NewOrder, OrderAggregate, OrderLine,
        OrderNotification, PaymentMethod,
    };
    use notification::{InMemoryChannel, RecipientResolver};
    use order_store::InMemoryOrderStore;
    use rpc::{
        InMemoryRestaurantRpc, InMemoryUserRpc, RestaurantInfo, RestaurantStatus, UserInfo,
        UserRole,
    };

    fn user(id: &str, email: &str, role: UserRole) -> UserInfo {
        UserInfo {
            id: UserId::new(id),
            email: email.to_string(),
            first_name: "Test".to_string(),
            last_name: id.to_string(),
            role,
        }
    }

    fn relay(store: InMemoryOrderStore, channel: InMemoryChannel) -> OutboxRelay<InMemoryOrderStore> {
        let users = InMemoryUserRpc::new();
        users.add_user(user("customer-1", "customer@example.com", UserRole::User));
        users.add_user(user("owner-1", "owner@example.com", UserRole::RestaurantOwner));
        let restaurants = InMemoryRestaurantRpc::new();
        restaurants.add_restaurant(RestaurantInfo {
            id: RestaurantId::new("r1"),
            name: "Bun Cha".to_string(),
            status: RestaurantStatus::Active,
            shipping_fee_per_km: Money::zero(),
            owner_id: UserId::new("owner-1"),
        });

        let fanout = NotificationFanout::new(
            Arc::new(channel),
            RecipientResolver::new(Arc::new(users), Arc::new(restaurants)),
        );
        let settings = FulfillmentSettings {
            outbox_max_attempts: 2,
            ..Default::default()
        };
        OutboxRelay::new(store, fanout, &settings)
    }

    fn order() -> OrderAggregate {
        OrderAggregate::create(
            NewOrder {
                order_id: OrderId::new("order-1"),
                user_id: UserId::new("customer-1"),
                restaurant_id: RestaurantId::new("r1"),
                payment_method: PaymentMethod::Cash,
                card_id: None,
                delivery_address: DeliveryAddress::new("1 Main St", "Hanoi"),
                delivery_fee: Money::zero(),
                lines: vec![OrderLine::new(
                    FoodSnapshot {
                        food_id: FoodId::new("f1"),
                        name: "Bun cha".to_string(),
                        description: String::new(),
                        image: None,
                    },
                    Money::from_cents(700),
                    1,
                )],
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_delivers_and_marks_messages() {
        let store = InMemoryOrderStore::new();
        let channel = InMemoryChannel::new();
        let order = order();
        store
            .insert(
                &order,
                vec![OutboxMessage::new(order.id().clone(), OrderNotification::Created)],
            )
            .await
            .unwrap();

        let relay = relay(store.clone(), channel.clone());
        let report = relay.deliver_for_order(order.id()).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert_eq!(channel.sent_count(), 2);
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failure_retries_then_gives_up() {
        let store = InMemoryOrderStore::new();
        let channel = InMemoryChannel::new();
        channel.set_fail_on_send(true);
        let order = order();
        store
            .insert(
                &order,
                vec![OutboxMessage::new(order.id().clone(), OrderNotification::Created)],
            )
            .await
            .unwrap();

        let relay = relay(store.clone(), channel.clone());

        let first = relay.run_once().await.unwrap();
        assert_eq!(first.retrying, 1);
        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.is_some());

        let second = relay.run_once().await.unwrap();
        assert_eq!(second.failed, 1);
        assert!(store.pending_outbox(10).await.unwrap().is_empty());

        let third = relay.run_once().await.unwrap();
        assert_eq!(third.attempted(), 0);
    }

    #[tokio::test]
    async fn test_retry_only_reaches_audiences_that_failed() {
        let store = InMemoryOrderStore::new();
        let channel = InMemoryChannel::new();
        channel.fail_for("owner@example.com");
        let order = order();
        store
            .insert(
                &order,
                vec![OutboxMessage::new(order.id().clone(), OrderNotification::Created)],
            )
            .await
            .unwrap();

        let relay = relay(store.clone(), channel.clone());

        let first = relay.run_once().await.unwrap();
        assert_eq!(first.retrying, 1);
        let pending = store.pending_outbox(10).await.unwrap();
        assert_eq!(pending[0].delivered_to, vec!["customer"]);
        assert_eq!(channel.sent_to("customer@example.com").len(), 1);

        channel.clear_failures();
        let second = relay.run_once().await.unwrap();
        assert_eq!(second.delivered, 1);
        assert_eq!(channel.sent_to("customer@example.com").len(), 1);
        assert_eq!(channel.sent_to("owner@example.com").len(), 1);
        assert!(store.pending_outbox(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_spawned_relay_drains_outbox() {
        let store = InMemoryOrderStore::new();
        let channel = InMemoryChannel::new();
        let order = order();
        store
            .insert(
                &order,
                vec![OutboxMessage::new(order.id().clone(), OrderNotification::Created)],
            )
            .await
            .unwrap();

        let handle = relay(store.clone(), channel.clone()).spawn(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.shutdown().await;

        assert!(store.pending_outbox(10).await.unwrap().is_empty());
        assert_eq!(channel.sent_count(), 2);
    }
}

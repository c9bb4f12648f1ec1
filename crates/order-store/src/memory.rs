use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, OrderAggregate, OrderTracking, RecordStatus, Version};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    OrderPage, OrderQuery, OutboxMessage, OutboxStatus, Result, StoreError, store::OrderStore,
};

#[derive(Debug, Default)]
struct MemoryState {
    orders: HashMap<OrderId, OrderAggregate>,
    outbox: Vec<OutboxMessage>,
    fail_on_write: bool,
}

/// In-memory order store implementation for testing and the demo server.
///
/// Provides the same atomicity and version checks as the PostgreSQL store.
/// Writes can be made to fail to simulate an unreachable database.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<MemoryState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail with `Unavailable`.
    pub async fn set_fail_on_write(&self, fail: bool) {
        self.state.write().await.fail_on_write = fail;
    }

    /// Returns the number of stored orders, deleted ones included.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns every outbox message, in insertion order.
    pub async fn outbox_messages(&self) -> Vec<OutboxMessage> {
        self.state.read().await.outbox.clone()
    }

    /// Clears all orders and outbox messages.
    pub async fn clear(&self) {
        let mut state = self.state.write().await;
        state.orders.clear();
        state.outbox.clear();
    }

    fn check_writable(state: &MemoryState) -> Result<()> {
        if state.fail_on_write {
            return Err(StoreError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }
        Ok(())
    }

    fn check_version(stored: &OrderAggregate, expected: Version) -> Result<()> {
        if stored.version() != expected {
            return Err(StoreError::ConcurrencyConflict {
                order_id: stored.id().clone(),
                expected,
                actual: stored.version(),
            });
        }
        Ok(())
    }

    fn pending_sorted<'a>(messages: impl Iterator<Item = &'a OutboxMessage>) -> Vec<OutboxMessage> {
        let mut pending: Vec<_> = messages
            .filter(|m| m.status == OutboxStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|m| m.created_at);
        pending
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<OrderAggregate>> {
        Ok(self.state.read().await.orders.get(order_id).cloned())
    }

    async fn insert(&self, aggregate: &OrderAggregate, outbox: Vec<OutboxMessage>) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_writable(&state)?;

        if state.orders.contains_key(aggregate.id()) {
            return Err(StoreError::AlreadyExists(aggregate.id().clone()));
        }

        let mut stored = aggregate.clone();
        stored.order.version = Version::first();
        state.orders.insert(stored.id().clone(), stored);
        state.outbox.extend(outbox);
        Ok(())
    }

    async fn update(
        &self,
        order: &Order,
        tracking: &OrderTracking,
        expected_version: Version,
        outbox: Vec<OutboxMessage>,
    ) -> Result<Version> {
        let mut state = self.state.write().await;
        Self::check_writable(&state)?;

        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::NotFound(order.id.clone()))?;
        Self::check_version(stored, expected_version)?;

        let new_version = expected_version.next();
        stored.order.shipper_id = order.shipper_id.clone();
        stored.order.status = order.status;
        stored.order.saga_status = order.saga_status;
        stored.order.audit.updated_by = order.audit.updated_by.clone();
        stored.order.audit.updated_at = order.audit.updated_at;
        stored.order.version = new_version;

        stored.tracking.state = tracking.state;
        stored.tracking.cancellation_reason = tracking.cancellation_reason.clone();
        stored.tracking.payment_status = tracking.payment_status;
        stored.tracking.payment_method = tracking.payment_method;
        stored.tracking.card_id = tracking.card_id.clone();
        stored.tracking.delivery_address = tracking.delivery_address.clone();
        stored.tracking.delivery_fee = tracking.delivery_fee;
        stored.tracking.estimated_delivery_minutes = tracking.estimated_delivery_minutes;
        stored.tracking.actual_delivery_minutes = tracking.actual_delivery_minutes;

        state.outbox.extend(outbox);
        Ok(new_version)
    }

    async fn soft_delete(&self, order: &Order, expected_version: Version) -> Result<Version> {
        let mut state = self.state.write().await;
        Self::check_writable(&state)?;

        let stored = state
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::NotFound(order.id.clone()))?;
        Self::check_version(stored, expected_version)?;

        let new_version = expected_version.next();
        stored.order.status = RecordStatus::Deleted;
        stored.order.audit.updated_by = order.audit.updated_by.clone();
        stored.order.audit.updated_at = order.audit.updated_at;
        stored.order.version = new_version;
        Ok(new_version)
    }

    async fn list(&self, query: OrderQuery) -> Result<OrderPage> {
        query.page_bounds()?;
        let state = self.state.read().await;

        let mut matching: Vec<&OrderAggregate> = state
            .orders
            .values()
            .filter(|aggregate| query.matches(aggregate))
            .collect();
        matching.sort_by(|a, b| {
            b.order
                .audit
                .created_at
                .cmp(&a.order.audit.created_at)
                .then_with(|| a.id().as_str().cmp(b.id().as_str()))
        });

        let total = matching.len() as u64;
        let page: Vec<&OrderAggregate> = matching
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.effective_limit())
            .collect();

        Ok(OrderPage {
            orders: page.iter().map(|a| a.order.clone()).collect(),
            trackings: page.iter().map(|a| a.tracking.clone()).collect(),
            total,
        })
    }

    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        let mut pending = Self::pending_sorted(state.outbox.iter());
        pending.truncate(limit);
        Ok(pending)
    }

    async fn pending_outbox_for_order(&self, order_id: &OrderId) -> Result<Vec<OutboxMessage>> {
        let state = self.state.read().await;
        Ok(Self::pending_sorted(
            state.outbox.iter().filter(|m| m.order_id == *order_id),
        ))
    }

    async fn mark_outbox_delivered(&self, message_id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        Self::check_writable(&state)?;

        let message = state
            .outbox
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(StoreError::OutboxMessageNotFound(message_id))?;
        message.status = OutboxStatus::Delivered;
        Ok(())
    }

    async fn mark_outbox_failed(
        &self,
        message_id: Uuid,
        error: &str,
        delivered_to: &[String],
        max_attempts: u32,
    ) -> Result<OutboxStatus> {
        let mut state = self.state.write().await;
        Self::check_writable(&state)?;

        let message = state
            .outbox
            .iter_mut()
            .find(|m| m.id == message_id)
            .ok_or(StoreError::OutboxMessageNotFound(message_id))?;
        Ok(message.record_failure(error, delivered_to, max_attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::OrderStoreExt;
    use chrono::{Duration, Utc};
    use common::{FoodId, RestaurantId, ShipperId, UserId};
    use domain::{
        DeliveryAddress, FoodSnapshot, Money, NewOrder, OrderLine, OrderNotification, OrderState,
        PaymentMethod, SagaStatus,
    };

    fn aggregate(id: &str, user: &str) -> OrderAggregate {
        OrderAggregate::create(
            NewOrder {
                order_id: OrderId::new(id),
                user_id: UserId::new(user),
                restaurant_id: RestaurantId::new("rest-1"),
                payment_method: PaymentMethod::Cash,
                card_id: None,
                delivery_address: DeliveryAddress::new("1 Main St", "Hanoi"),
                delivery_fee: Money::zero(),
                lines: vec![OrderLine::new(
                    FoodSnapshot {
                        food_id: FoodId::new("food-1"),
                        name: "Pho".to_string(),
                        description: "Beef noodle soup".to_string(),
                        image: None,
                    },
                    Money::from_cents(500),
                    2,
                )],
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");

        store
            .insert(
                &order,
                OutboxMessage::batch(order.id(), vec![OrderNotification::Created]),
            )
            .await
            .unwrap();

        let loaded = store.get(order.id()).await.unwrap();
        assert_eq!(loaded, order);
        assert_eq!(store.pending_outbox(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_insert_duplicate_rejected() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");

        store.insert(&order, vec![]).await.unwrap();
        let result = store.insert(&order, vec![]).await;
        assert!(matches!(result, Err(StoreError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_update_increments_version() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");
        store.insert(&order, vec![]).await.unwrap();

        let mut next = order.clone();
        next.tracking.state = OrderState::Preparing;
        next.order.shipper_id = Some(ShipperId::new("S1"));

        let version = store.save(&order, &next, vec![]).await.unwrap();
        assert_eq!(version, Version::new(2));

        let loaded = store.get(order.id()).await.unwrap();
        assert_eq!(loaded.state(), OrderState::Preparing);
        assert_eq!(loaded.order.shipper_id, Some(ShipperId::new("S1")));
        assert_eq!(loaded.version(), Version::new(2));
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");
        store.insert(&order, vec![]).await.unwrap();

        let next = order.clone();
        store.save(&order, &next, vec![]).await.unwrap();

        let result = store.save(&order, &next, vec![]).await;
        match result {
            Err(StoreError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Version::new(1));
                assert_eq!(actual, Version::new(2));
            }
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_update_never_rewrites_owner_or_restaurant() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");
        store.insert(&order, vec![]).await.unwrap();

        let mut next = order.clone();
        next.order.user_id = UserId::new("intruder");
        next.tracking.restaurant_id = RestaurantId::new("other");
        next.order.total_price = Money::from_cents(1);
        store.save(&order, &next, vec![]).await.unwrap();

        let loaded = store.get(order.id()).await.unwrap();
        assert_eq!(loaded.order.user_id, UserId::new("user-1"));
        assert_eq!(loaded.tracking.restaurant_id, RestaurantId::new("rest-1"));
        assert_eq!(loaded.order.total_price, Money::from_cents(1000));
    }

    #[tokio::test]
    async fn test_failed_write_leaves_nothing_behind() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");
        store.insert(&order, vec![]).await.unwrap();

        store.set_fail_on_write(true).await;
        let mut next = order.clone();
        next.tracking.state = OrderState::Cancel;
        let result = store
            .save(
                &order,
                &next,
                OutboxMessage::batch(order.id(), vec![OrderNotification::Created]),
            )
            .await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));

        store.set_fail_on_write(false).await;
        let loaded = store.get(order.id()).await.unwrap();
        assert_eq!(loaded, order);
        assert!(store.outbox_messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_soft_delete() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");
        store.insert(&order, vec![]).await.unwrap();

        let deleted = order.soft_deleted(&UserId::new("user-1"), Utc::now()).unwrap();
        let version = store
            .soft_delete(&deleted.order, order.version())
            .await
            .unwrap();
        assert_eq!(version, Version::new(2));

        assert!(store.get(order.id()).await.unwrap().is_deleted());
        assert_eq!(store.list(OrderQuery::new()).await.unwrap().total, 0);
        assert_eq!(
            store
                .list(OrderQuery::new().include_deleted())
                .await
                .unwrap()
                .total,
            1
        );
    }

    #[tokio::test]
    async fn test_list_newest_first_with_pagination() {
        let store = InMemoryOrderStore::new();
        let now = Utc::now();
        for i in 0..5 {
            let mut order = aggregate(&format!("order-{i}"), "user-1");
            order.order.audit.created_at = now + Duration::seconds(i);
            store.insert(&order, vec![]).await.unwrap();
        }
        store.insert(&aggregate("other", "user-2"), vec![]).await.unwrap();

        let page = store
            .list(OrderQuery::new().user_id(UserId::new("user-1")).limit(2).offset(1))
            .await
            .unwrap();

        assert_eq!(page.total, 5);
        let ids: Vec<_> = page.orders.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["order-3", "order-2"]);
        assert_eq!(page.trackings.len(), 2);
        assert_eq!(page.trackings[0].order_id, OrderId::new("order-3"));
    }

    #[tokio::test]
    async fn test_list_rejects_out_of_range_offset() {
        let store = InMemoryOrderStore::new();
        store.insert(&aggregate("order-1", "user-1"), vec![]).await.unwrap();

        let result = store.list(OrderQuery::new().offset(usize::MAX)).await;
        assert!(matches!(result, Err(StoreError::InvalidQuery(_))));

        let page = store.list(OrderQuery::new().limit(usize::MAX)).await.unwrap();
        assert_eq!(page.orders.len(), 1);
    }

    #[tokio::test]
    async fn test_list_by_saga_status() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");
        store.insert(&order, vec![]).await.unwrap();
        let failed = order.with_saga_status(SagaStatus::PaymentFailed, Utc::now());
        store.save(&order, &failed, vec![]).await.unwrap();

        let page = store
            .list(OrderQuery::new().saga_statuses(vec![SagaStatus::PaymentFailed]))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_outbox_delivery_bookkeeping() {
        let store = InMemoryOrderStore::new();
        let order = aggregate("order-1", "user-1");
        let messages = OutboxMessage::batch(
            order.id(),
            vec![
                OrderNotification::Created,
                OrderNotification::ShipperAssigned {
                    shipper_id: ShipperId::new("S1"),
                },
            ],
        );
        let (first, second) = (messages[0].id, messages[1].id);
        store.insert(&order, messages).await.unwrap();

        store.mark_outbox_delivered(first).await.unwrap();
        assert_eq!(
            store.mark_outbox_failed(second, "boom", &[], 2).await.unwrap(),
            OutboxStatus::Pending
        );
        assert_eq!(
            store.pending_outbox_for_order(order.id()).await.unwrap().len(),
            1
        );
        assert_eq!(
            store.mark_outbox_failed(second, "boom", &[], 2).await.unwrap(),
            OutboxStatus::Failed
        );
        assert!(store.pending_outbox(10).await.unwrap().is_empty());

        let missing = store.mark_outbox_delivered(Uuid::new_v4()).await;
        assert!(matches!(missing, Err(StoreError::OutboxMessageNotFound(_))));
    }
}

use async_trait::async_trait;
use common::OrderId;
use domain::{Order, OrderAggregate, OrderTracking, Version};
use uuid::Uuid;

use crate::{OrderPage, OrderQuery, OutboxMessage, OutboxStatus, Result, StoreError};

/// Core trait for order store implementations.
///
/// Every write is atomic: the order rows and the outbox messages passed
/// alongside them are committed together or not at all.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Loads an order with its tracking record and detail lines.
    ///
    /// Soft-deleted orders are returned; callers decide how to treat them.
    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<OrderAggregate>>;

    /// Inserts a new aggregate at [`Version::first`].
    async fn insert(&self, aggregate: &OrderAggregate, outbox: Vec<OutboxMessage>) -> Result<()>;

    /// Writes the mutable columns of an order and its tracking record.
    ///
    /// Fails with `ConcurrencyConflict` if the stored version differs from
    /// `expected_version`. Returns the new version (`expected_version + 1`).
    /// Owner, restaurant, total price and detail lines are never rewritten.
    async fn update(
        &self,
        order: &Order,
        tracking: &OrderTracking,
        expected_version: Version,
        outbox: Vec<OutboxMessage>,
    ) -> Result<Version>;

    /// Marks an order deleted, with the same version check as `update`.
    ///
    /// The audit columns are taken from `order`.
    async fn soft_delete(&self, order: &Order, expected_version: Version) -> Result<Version>;

    /// Lists orders matching a query, newest first.
    async fn list(&self, query: OrderQuery) -> Result<OrderPage>;

    /// Returns up to `limit` pending outbox messages, oldest first.
    async fn pending_outbox(&self, limit: usize) -> Result<Vec<OutboxMessage>>;

    /// Returns all pending outbox messages of one order, oldest first.
    async fn pending_outbox_for_order(&self, order_id: &OrderId) -> Result<Vec<OutboxMessage>>;

    /// Marks an outbox message delivered.
    async fn mark_outbox_delivered(&self, message_id: Uuid) -> Result<()>;

    /// Records a failed delivery attempt, adding `delivered_to` to the
    /// audiences already reached. The message becomes `failed` once its
    /// attempts reach `max_attempts`. Returns the resulting status.
    async fn mark_outbox_failed(
        &self,
        message_id: Uuid,
        error: &str,
        delivered_to: &[String],
        max_attempts: u32,
    ) -> Result<OutboxStatus>;
}

/// Extension trait providing convenience methods for order stores.
#[async_trait]
pub trait OrderStoreExt: OrderStore {
    /// Loads an order, failing with `NotFound` if it does not exist.
    async fn get(&self, order_id: &OrderId) -> Result<OrderAggregate> {
        self.find_by_id(order_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(order_id.clone()))
    }

    /// Checks if an order exists.
    async fn exists(&self, order_id: &OrderId) -> Result<bool> {
        Ok(self.find_by_id(order_id).await?.is_some())
    }

    /// Writes a modified aggregate back, checking against its loaded version.
    async fn save(
        &self,
        current: &OrderAggregate,
        next: &OrderAggregate,
        outbox: Vec<OutboxMessage>,
    ) -> Result<Version> {
        self.update(&next.order, &next.tracking, current.version(), outbox)
            .await
    }
}

// Blanket implementation for all OrderStore implementations
impl<T: OrderStore + ?Sized> OrderStoreExt for T {}

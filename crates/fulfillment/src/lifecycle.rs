//! Order lifecycle operations on persisted orders.

use chrono::Utc;
use common::{OrderId, UserId};
use domain::{
    OrderAggregate, OrderStateMachine, PaymentStatus, Transition, TransitionRequest,
};
use metrics::counter;
use order_store::{OrderPage, OrderQuery, OrderStore, OutboxMessage, StoreError};
use tracing::{info, warn};

use crate::{FulfillmentError, OutboxRelay, Result};

/// Reads, transitions and deletes orders.
///
/// Every change is computed on a copy and written with a version check, so
/// a failed or conflicting write leaves the stored order untouched.
#[derive(Clone)]
pub struct OrderLifecycleService<S> {
    store: S,
    machine: OrderStateMachine,
    relay: OutboxRelay<S>,
}

impl<S> OrderLifecycleService<S>
where
    S: OrderStore + Clone + 'static,
{
    pub fn new(store: S, machine: OrderStateMachine, relay: OutboxRelay<S>) -> Self {
        Self {
            store,
            machine,
            relay,
        }
    }

    /// Loads a live order. Soft-deleted orders are reported as not found.
    #[tracing::instrument(skip(self))]
    pub async fn get(&self, order_id: &OrderId) -> Result<OrderAggregate> {
        self.store
            .find_by_id(order_id)
            .await?
            .filter(|order| !order.is_deleted())
            .ok_or_else(|| FulfillmentError::OrderNotFound(order_id.clone()))
    }

    #[tracing::instrument(skip(self))]
    pub async fn list(&self, query: OrderQuery) -> Result<OrderPage> {
        Ok(self.store.list(query).await?)
    }

    /// Moves an order to the requested state.
    #[tracing::instrument(skip(self, request), fields(to = %request.target))]
    pub async fn transition(
        &self,
        order_id: &OrderId,
        request: TransitionRequest,
        actor: &UserId,
    ) -> Result<OrderAggregate> {
        let current = self.get(order_id).await?;

        let transition = self
            .machine
            .transition(&current, &request, actor, Utc::now())
            .inspect_err(|e| {
                counter!("order_transition_rejected_total").increment(1);
                warn!(%order_id, from = %current.state(), error = %e, "Transition rejected");
            })?;

        let updated = self.apply(&current, transition).await?;
        counter!("order_transitions_total", "to" => request.target.as_str()).increment(1);
        info!(%order_id, state = %updated.state(), version = %updated.version(), "Order transitioned");
        Ok(updated)
    }

    /// Sets the payment status without moving the order.
    #[tracing::instrument(skip(self))]
    pub async fn update_payment_status(
        &self,
        order_id: &OrderId,
        status: PaymentStatus,
        actor: &UserId,
    ) -> Result<OrderAggregate> {
        let current = self.get(order_id).await?;
        let transition = self
            .machine
            .update_payment_status(&current, status, actor, Utc::now())?;
        self.apply(&current, transition).await
    }

    /// Soft-deletes an order waiting for a shipper or being prepared.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, order_id: &OrderId, actor: &UserId) -> Result<()> {
        let current = self.get(order_id).await?;
        let deleted = current.soft_deleted(actor, Utc::now())?;
        self.store
            .soft_delete(&deleted.order, current.version())
            .await
            .map_err(|e| not_found_as_order(order_id, e))?;
        info!(%order_id, "Order deleted");
        Ok(())
    }

    async fn apply(
        &self,
        current: &OrderAggregate,
        transition: Transition,
    ) -> Result<OrderAggregate> {
        let Transition {
            aggregate: mut next,
            effects,
        } = transition;
        let outbox = OutboxMessage::batch(current.id(), effects.notifications());

        let version = self
            .store
            .update(&next.order, &next.tracking, current.version(), outbox)
            .await
            .map_err(|e| not_found_as_order(current.id(), e))?;
        next.order.version = version;

        if let Err(e) = self.relay.deliver_for_order(current.id()).await {
            warn!(order_id = %current.id(), error = %e, "Notification delivery deferred to relay");
        }
        Ok(next)
    }
}

fn not_found_as_order(order_id: &OrderId, error: StoreError) -> FulfillmentError {
    match error {
        StoreError::NotFound(_) => FulfillmentError::OrderNotFound(order_id.clone()),
        other => other.into(),
    }
}

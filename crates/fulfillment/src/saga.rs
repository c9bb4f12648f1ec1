//! Order creation saga.
//!
//! Steps 1 to 6 validate and persist; any failure there leaves nothing
//! behind. Capture runs after the order is durable, so a capture failure
//! leaves the order in `payment_failed` for the reconciler to retry. The
//! cart update and notification delivery are best-effort.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{CardId, CartId, OrderId, UserId};
use domain::{
    DeliveryAddress, NewOrder, OrderAggregate, OrderError, OrderNotification, PaymentMethod,
    SagaStatus,
};
use metrics::{counter, histogram};
use order_store::{OrderStore, OrderStoreExt, OutboxMessage};
use rpc::{CartRpc, CartStatus, with_timeout};
use tracing::{info, warn};

use crate::{
    CartConversionService, FulfillmentError, FulfillmentSettings, InventoryChecker, OutboxRelay,
    PaymentProcessor, Result,
};

/// Step name: check mandatory inputs.
pub const STEP_VALIDATE_INPUT: &str = "validate_input";

/// Step name: check cart ownership and cart invariants.
pub const STEP_VALIDATE_CART: &str = "validate_cart";

/// Step name: price cart items into order lines.
pub const STEP_CONVERT_CART: &str = "convert_cart";

/// Step name: check restaurant and food availability.
pub const STEP_CHECK_INVENTORY: &str = "check_inventory";

/// Step name: check payment details.
pub const STEP_VALIDATE_PAYMENT: &str = "validate_payment";

/// Step name: write the order atomically.
pub const STEP_PERSIST_ORDER: &str = "persist_order";

/// Step name: capture payment for the persisted order.
pub const STEP_CAPTURE_PAYMENT: &str = "capture_payment";

/// Step name: mark the cart processed.
pub const STEP_MARK_CART_PROCESSED: &str = "mark_cart_processed";

/// Step name: deliver the creation notifications.
pub const STEP_NOTIFY: &str = "notify";

/// Input of the order creation saga.
#[derive(Debug, Clone)]
pub struct CreateOrderRequest {
    pub user_id: UserId,
    pub cart_id: CartId,
    pub delivery_address: DeliveryAddress,
    pub payment_method: Option<PaymentMethod>,
    pub card_id: Option<CardId>,
}

/// Orchestrates order creation from a cart.
#[derive(Clone)]
pub struct OrderCreationSaga<S> {
    store: S,
    conversion: CartConversionService,
    inventory: InventoryChecker,
    payments: PaymentProcessor,
    carts: Arc<dyn CartRpc>,
    relay: OutboxRelay<S>,
    settings: FulfillmentSettings,
}

impl<S> OrderCreationSaga<S>
where
    S: OrderStore + Clone + 'static,
{
    pub fn new(
        store: S,
        conversion: CartConversionService,
        inventory: InventoryChecker,
        payments: PaymentProcessor,
        carts: Arc<dyn CartRpc>,
        relay: OutboxRelay<S>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            store,
            conversion,
            inventory,
            payments,
            carts,
            relay,
            settings,
        }
    }

    /// Creates an order from the request's cart and returns its id.
    ///
    /// A capture failure returns `PaymentCaptureFailed`; the order exists in
    /// that case and its id is carried by the error.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id, cart_id = %request.cart_id))]
    pub async fn execute(&self, request: CreateOrderRequest) -> Result<OrderId> {
        counter!("order_saga_executions_total").increment(1);
        let started = Instant::now();

        let result = self.run(request).await;

        histogram!("order_saga_duration_seconds").record(started.elapsed().as_secs_f64());
        if let Ok(order_id) = &result {
            counter!("order_saga_completed_total").increment(1);
            info!(%order_id, "Order created");
        }
        result
    }

    async fn run(&self, request: CreateOrderRequest) -> Result<OrderId> {
        // 1. Inputs
        let method = validate_input(&request).map_err(step_failed(STEP_VALIDATE_INPUT))?;

        // 2. Cart invariants
        let items = self
            .conversion
            .validate(&request.cart_id, &request.user_id)
            .await
            .map_err(step_failed(STEP_VALIDATE_CART))?;

        // 3. Pricing
        let converted = self
            .conversion
            .convert(&items, &request.delivery_address)
            .await
            .map_err(step_failed(STEP_CONVERT_CART))?;

        // 4. Availability
        self.inventory
            .check(&converted.restaurant.id, &converted.items())
            .await
            .map_err(step_failed(STEP_CHECK_INVENTORY))?;

        // 5. Payment details, no charge yet
        self.payments
            .validate(&request.user_id, method, request.card_id.as_ref())
            .await
            .map_err(step_failed(STEP_VALIDATE_PAYMENT))?;

        // 6. Order, tracking, details and the creation notice in one write
        let order = OrderAggregate::create(
            NewOrder {
                order_id: OrderId::generate(),
                user_id: request.user_id.clone(),
                restaurant_id: converted.restaurant.id.clone(),
                payment_method: method,
                card_id: request.card_id.clone().filter(|_| method.is_card()),
                delivery_address: request.delivery_address.clone(),
                delivery_fee: converted.delivery_fee,
                lines: converted.lines,
            },
            Utc::now(),
        )
        .map_err(step_failed(STEP_PERSIST_ORDER))?;
        let order_id = order.id().clone();

        self.store
            .insert(
                &order,
                vec![OutboxMessage::new(order_id.clone(), OrderNotification::Created)],
            )
            .await
            .map_err(step_failed(STEP_PERSIST_ORDER))?;

        // 7. Capture
        let captured = self.capture(&order).await;

        // 8, 9. Best-effort follow-ups; the order stays either way
        self.mark_cart_processed(&request.cart_id).await;
        self.notify(&order_id).await;

        captured.map(|()| order_id)
    }

    async fn capture(&self, order: &OrderAggregate) -> Result<()> {
        match self.payments.capture(order).await {
            Ok(receipt) => {
                info!(
                    order_id = %order.id(),
                    transaction_id = %receipt.transaction_id,
                    "Payment captured"
                );
                let (next, outbox) = settle_capture(order, true, Utc::now());
                if let Err(e) = self.store.save(order, &next, outbox).await {
                    // The capture succeeded; reconciliation picks the order up
                    // again and the gateway returns the same transaction.
                    tracing::error!(order_id = %order.id(), error = %e, "Failed to confirm order after capture");
                }
                Ok(())
            }
            Err(e) => {
                let (next, outbox) = settle_capture(order, false, Utc::now());
                if let Err(store_err) = self.store.save(order, &next, outbox).await {
                    tracing::error!(order_id = %order.id(), error = %store_err, "Failed to record payment failure");
                }
                Err(step_failed(STEP_CAPTURE_PAYMENT)(e))
            }
        }
    }

    async fn mark_cart_processed(&self, cart_id: &CartId) {
        let result = with_timeout(
            "cart",
            self.settings.rpc_timeout,
            self.carts.update_status(cart_id, CartStatus::Processed),
        )
        .await;
        if let Err(e) = result {
            warn!(step = STEP_MARK_CART_PROCESSED, %cart_id, error = %e, "Best-effort step failed");
        }
    }

    async fn notify(&self, order_id: &OrderId) {
        if let Err(e) = self.relay.deliver_for_order(order_id).await {
            warn!(step = STEP_NOTIFY, %order_id, error = %e, "Best-effort step failed");
        }
    }
}

/// Resolves the payment method and checks mandatory inputs.
fn validate_input(request: &CreateOrderRequest) -> Result<PaymentMethod> {
    if request.user_id.is_blank() {
        return Err(OrderError::MissingField("user_id").into());
    }
    if request.cart_id.is_blank() {
        return Err(OrderError::MissingField("cart_id").into());
    }
    if request.delivery_address.is_incomplete() {
        return Err(OrderError::MissingField("delivery_address").into());
    }
    let method = request
        .payment_method
        .ok_or(OrderError::MissingField("payment_method"))?;
    if method.is_card() && request.card_id.as_ref().is_none_or(CardId::is_blank) {
        return Err(OrderError::CardRequired(method).into());
    }
    Ok(method)
}

/// Builds the aggregate and outbox messages recording a capture outcome.
///
/// A confirmed card capture flips the payment status to `paid`, which is
/// announced like any other payment status change.
pub(crate) fn settle_capture(
    current: &OrderAggregate,
    captured: bool,
    now: DateTime<Utc>,
) -> (OrderAggregate, Vec<OutboxMessage>) {
    let status = if captured {
        SagaStatus::Confirmed
    } else {
        SagaStatus::PaymentFailed
    };
    let next = current.with_saga_status(status, now);

    let mut outbox = Vec::new();
    if next.tracking.payment_status != current.tracking.payment_status {
        outbox.push(OutboxMessage::new(
            current.id().clone(),
            OrderNotification::PaymentStatusChanged {
                status: next.tracking.payment_status,
            },
        ));
    }
    (next, outbox)
}

fn step_failed<E>(step: &'static str) -> impl FnOnce(E) -> FulfillmentError
where
    E: Into<FulfillmentError>,
{
    move |error| {
        let error = error.into();
        counter!("order_saga_failed_total", "step" => step).increment(1);
        warn!(step, error = %error, "Saga step failed");
        error
    }
}

//! Order aggregate: the order row, its tracking record and its detail lines.

use chrono::{DateTime, Utc};
use common::{CardId, OrderId, RestaurantId, ShipperId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    DeliveryAddress, FoodSnapshot, Money, OrderError, OrderState, PaymentMethod, PaymentStatus,
    RecordStatus, SagaStatus, Version,
};

/// Audit columns shared by order records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Audit {
    pub created_by: UserId,
    pub updated_by: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Audit {
    /// Creates audit info for a record created by `actor` at `now`.
    pub fn created(actor: &UserId, now: DateTime<Utc>) -> Self {
        Self {
            created_by: actor.clone(),
            updated_by: actor.clone(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records a modification.
    pub fn touch(&mut self, actor: &UserId, now: DateTime<Utc>) {
        self.updated_by = actor.clone();
        self.updated_at = now;
    }
}

/// Order aggregate root row.
///
/// `user_id` is never rewritten after insert; stores only persist the
/// mutable columns on update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub total_price: Money,
    pub shipper_id: Option<ShipperId>,
    pub status: RecordStatus,
    pub saga_status: SagaStatus,
    pub version: Version,
    pub audit: Audit,
}

/// Mutable fulfillment state of an order (1:1 with [`Order`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderTracking {
    pub order_id: OrderId,
    pub restaurant_id: RestaurantId,
    pub state: OrderState,
    pub cancellation_reason: Option<String>,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub card_id: Option<CardId>,
    pub delivery_address: DeliveryAddress,
    pub delivery_fee: Money,
    pub estimated_delivery_minutes: Option<i64>,
    pub actual_delivery_minutes: Option<i64>,
}

/// An order line holding an immutable food snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetail {
    pub order_id: OrderId,
    pub food: FoodSnapshot,
    pub unit_price: Money,
    pub quantity: u32,
    pub discount: Money,
}

impl OrderDetail {
    /// Returns unit price times quantity, before discount.
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }
}

/// A line to be written when an order is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub food: FoodSnapshot,
    pub unit_price: Money,
    pub quantity: u32,
    pub discount: Money,
}

impl OrderLine {
    /// Creates a line without discount.
    pub fn new(food: FoodSnapshot, unit_price: Money, quantity: u32) -> Self {
        Self {
            food,
            unit_price,
            quantity,
            discount: Money::zero(),
        }
    }

    /// Sums unit price times quantity over `lines`, failing on overflow.
    pub fn checked_total(lines: &[OrderLine]) -> Result<Money, OrderError> {
        lines.iter().try_fold(Money::zero(), |acc, line| {
            line.unit_price
                .checked_multiply(line.quantity)
                .and_then(|line_total| acc.checked_add(line_total))
                .ok_or_else(|| OrderError::TotalOverflow(line.food.food_id.clone()))
        })
    }
}

/// Everything needed to create an order aggregate.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub restaurant_id: RestaurantId,
    pub payment_method: PaymentMethod,
    pub card_id: Option<CardId>,
    pub delivery_address: DeliveryAddress,
    pub delivery_fee: Money,
    pub lines: Vec<OrderLine>,
}

/// Order, tracking record and detail lines, read and written together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    pub order: Order,
    pub tracking: OrderTracking,
    pub details: Vec<OrderDetail>,
}

impl OrderAggregate {
    /// Builds a new aggregate in its initial state.
    ///
    /// The total price is the sum of unit price times quantity over all lines,
    /// computed before any discount.
    pub fn create(new: NewOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if new.lines.is_empty() {
            return Err(OrderError::NoItems);
        }

        for line in &new.lines {
            if line.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    food_id: line.food.food_id.clone(),
                    quantity: line.quantity,
                });
            }
            if line.unit_price.is_negative() {
                return Err(OrderError::InvalidPrice {
                    food_id: line.food.food_id.clone(),
                    price: line.unit_price.cents(),
                });
            }
        }

        let total_price = OrderLine::checked_total(&new.lines)?;

        if !total_price.is_positive() {
            return Err(OrderError::InvalidTotal(total_price));
        }

        let details = new
            .lines
            .into_iter()
            .map(|line| OrderDetail {
                order_id: new.order_id.clone(),
                food: line.food,
                unit_price: line.unit_price,
                quantity: line.quantity,
                discount: line.discount,
            })
            .collect();

        Ok(Self {
            order: Order {
                id: new.order_id.clone(),
                user_id: new.user_id.clone(),
                total_price,
                shipper_id: None,
                status: RecordStatus::Active,
                saga_status: SagaStatus::PaymentPending,
                version: Version::first(),
                audit: Audit::created(&new.user_id, now),
            },
            tracking: OrderTracking {
                order_id: new.order_id,
                restaurant_id: new.restaurant_id,
                state: OrderState::WaitingForShipper,
                cancellation_reason: None,
                payment_status: PaymentStatus::Pending,
                payment_method: new.payment_method,
                card_id: new.card_id,
                delivery_address: new.delivery_address,
                delivery_fee: new.delivery_fee,
                estimated_delivery_minutes: None,
                actual_delivery_minutes: None,
            },
            details,
        })
    }

    pub fn id(&self) -> &OrderId {
        &self.order.id
    }

    pub fn state(&self) -> OrderState {
        self.tracking.state
    }

    pub fn version(&self) -> Version {
        self.order.version
    }

    pub fn is_deleted(&self) -> bool {
        self.order.status == RecordStatus::Deleted
    }

    /// Whole minutes elapsed since the order was created, never negative.
    pub fn elapsed_minutes(&self, now: DateTime<Utc>) -> i64 {
        (now - self.order.audit.created_at).num_minutes().max(0)
    }

    /// Returns a soft-deleted copy, if the current state allows deletion.
    pub fn soft_deleted(&self, actor: &UserId, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if self.is_deleted() {
            return Err(OrderError::Deleted);
        }
        if !self.tracking.state.is_deletable() {
            return Err(OrderError::DeletionNotAllowed(self.tracking.state));
        }

        let mut next = self.clone();
        next.order.status = RecordStatus::Deleted;
        next.order.audit.touch(actor, now);
        Ok(next)
    }

    /// Returns a copy with the saga status (and, for captured card payments,
    /// the payment status) updated.
    pub fn with_saga_status(&self, saga_status: SagaStatus, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.order.saga_status = saga_status;
        if saga_status == SagaStatus::Confirmed && next.tracking.payment_method.is_card() {
            next.tracking.payment_status = PaymentStatus::Paid;
        }
        next.order.audit.updated_at = now;
        next
    }
}

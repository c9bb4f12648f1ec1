//! Order aggregate and related types.

mod aggregate;
mod events;
mod state;
mod transition;
mod value_objects;

pub use aggregate::{Audit, NewOrder, Order, OrderAggregate, OrderDetail, OrderLine, OrderTracking};
pub use events::{NotificationKind, OrderNotification};
pub use state::OrderState;
pub use transition::{
    DEFAULT_ESTIMATED_DELIVERY_MINUTES, OrderStateMachine, Transition, TransitionEffects,
    TransitionRequest,
};
pub use value_objects::{
    DeliveryAddress, FoodSnapshot, Money, PaymentMethod, PaymentStatus, RecordStatus, SagaStatus,
    Version,
};

use common::FoodId;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// A mandatory input was absent or blank.
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// Card payment methods need a card.
    #[error("Card id is required for payment method {0}")]
    CardRequired(PaymentMethod),

    /// Unknown payment method.
    #[error("Invalid payment method: {0}")]
    InvalidPaymentMethod(String),

    /// Payment status outside {pending, paid}.
    #[error("Invalid payment status: {0}")]
    InvalidPaymentStatus(String),

    /// Unknown order state name.
    #[error("Invalid order state: {0}")]
    InvalidState(String),

    /// Unknown record status stored for an order.
    #[error("Invalid record status: {0}")]
    InvalidRecordStatus(String),

    /// Unknown saga status stored for an order.
    #[error("Invalid saga status: {0}")]
    InvalidSagaStatus(String),

    /// Target state is not a successor of the current state.
    #[error("Invalid state transition: cannot move from {from} to {to}")]
    InvalidStateTransition { from: OrderState, to: OrderState },

    /// Moving on the way needs an attached shipper.
    #[error("A shipper must be assigned before the order can be on the way")]
    ShipperRequired,

    /// Cancelling needs a reason.
    #[error("Cancellation reason is required")]
    CancellationReasonRequired,

    /// Invalid line quantity.
    #[error("Invalid quantity for food {food_id}: {quantity} (must be greater than 0)")]
    InvalidQuantity { food_id: FoodId, quantity: u32 },

    /// Negative line price.
    #[error("Invalid price for food {food_id}: {price} (must not be negative)")]
    InvalidPrice { food_id: FoodId, price: i64 },

    /// Order total must be positive.
    #[error("Invalid order total: {0} (must be greater than 0)")]
    InvalidTotal(Money),

    /// Line or order total does not fit in the money range.
    #[error("Order total overflows for food {0}")]
    TotalOverflow(FoodId),

    /// Order has no lines.
    #[error("Order has no items")]
    NoItems,

    /// Soft delete attempted outside a deletable state.
    #[error("Order cannot be deleted in {0} state")]
    DeletionNotAllowed(OrderState),

    /// The order has been soft-deleted.
    #[error("Order has been deleted")]
    Deleted,
}

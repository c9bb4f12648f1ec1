//! Domain layer for the order fulfillment core.
//!
//! This crate provides:
//! - The order aggregate (order row, tracking record, detail lines)
//! - Value objects (money, payment method/status, delivery address, snapshots)
//! - The order state table and the pure transition logic
//! - Notification events emitted by creation and transitions

pub mod order;

pub use order::{
    Audit, DEFAULT_ESTIMATED_DELIVERY_MINUTES, DeliveryAddress, FoodSnapshot, Money, NewOrder,
    NotificationKind, Order, OrderAggregate, OrderDetail, OrderError, OrderLine,
    OrderNotification, OrderState, OrderStateMachine, OrderTracking, PaymentMethod,
    PaymentStatus, RecordStatus, SagaStatus, Transition, TransitionEffects, TransitionRequest,
    Version,
};

//! Order notification events.

use common::ShipperId;
use serde::{Deserialize, Serialize};

use super::{OrderState, PaymentStatus};

/// Something that happened to an order and that interested parties should hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum OrderNotification {
    /// The order was created by the saga.
    Created,

    /// The fulfillment state moved.
    StateChanged { from: OrderState, to: OrderState },

    /// A shipper was attached to the order.
    ShipperAssigned { shipper_id: ShipperId },

    /// The payment status was set explicitly.
    PaymentStatusChanged { status: PaymentStatus },

    /// The order was cancelled. The shipper released by the cancellation, if
    /// any, is carried here because the order no longer references it.
    Cancelled {
        reason: String,
        released_shipper: Option<ShipperId>,
    },
}

/// Discriminant of [`OrderNotification`], used to key message templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Created,
    StateChanged,
    ShipperAssigned,
    PaymentStatusChanged,
    Cancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Created => "created",
            NotificationKind::StateChanged => "state_changed",
            NotificationKind::ShipperAssigned => "shipper_assigned",
            NotificationKind::PaymentStatusChanged => "payment_status_changed",
            NotificationKind::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl OrderNotification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            OrderNotification::Created => NotificationKind::Created,
            OrderNotification::StateChanged { .. } => NotificationKind::StateChanged,
            OrderNotification::ShipperAssigned { .. } => NotificationKind::ShipperAssigned,
            OrderNotification::PaymentStatusChanged { .. } => {
                NotificationKind::PaymentStatusChanged
            }
            OrderNotification::Cancelled { .. } => NotificationKind::Cancelled,
        }
    }
}

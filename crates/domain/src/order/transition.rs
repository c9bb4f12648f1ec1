//! Post-creation lifecycle transitions.
//!
//! Transitions are computed on a copy of the aggregate. The caller persists
//! the returned aggregate; until that write succeeds nothing has changed.

use chrono::{DateTime, Utc};
use common::{ShipperId, UserId};

use super::{
    OrderAggregate, OrderError, OrderNotification, OrderState, PaymentMethod, PaymentStatus,
};

/// Estimated delivery time set when an order goes on the way.
pub const DEFAULT_ESTIMATED_DELIVERY_MINUTES: i64 = 30;

/// A request to move an order to `target`.
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub target: OrderState,
    pub shipper_id: Option<ShipperId>,
    pub cancellation_reason: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

impl TransitionRequest {
    /// Creates a request with no optional parameters.
    pub fn to(target: OrderState) -> Self {
        Self {
            target,
            shipper_id: None,
            cancellation_reason: None,
            payment_status: None,
        }
    }

    /// Attaches a shipper (used by `preparing`).
    pub fn with_shipper(mut self, shipper_id: impl Into<ShipperId>) -> Self {
        self.shipper_id = Some(shipper_id.into());
        self
    }

    /// Sets the cancellation reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.cancellation_reason = Some(reason.into());
        self
    }

    /// Overrides the payment status alongside the transition.
    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }
}

/// What changed during a transition, used to decide which notifications go out.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionEffects {
    pub from: OrderState,
    pub to: OrderState,
    pub shipper_assigned: Option<ShipperId>,
    pub released_shipper: Option<ShipperId>,
    pub cancellation_reason: Option<String>,
    pub payment_status_override: Option<PaymentStatus>,
}

impl TransitionEffects {
    /// Notifications owed for this transition, in emission order.
    pub fn notifications(&self) -> Vec<OrderNotification> {
        let mut notifications = Vec::with_capacity(4);

        if self.from != self.to {
            notifications.push(OrderNotification::StateChanged {
                from: self.from,
                to: self.to,
            });
        }
        if let Some(reason) = &self.cancellation_reason {
            notifications.push(OrderNotification::Cancelled {
                reason: reason.clone(),
                released_shipper: self.released_shipper.clone(),
            });
        }
        if let Some(shipper_id) = &self.shipper_assigned {
            notifications.push(OrderNotification::ShipperAssigned {
                shipper_id: shipper_id.clone(),
            });
        }
        if let Some(status) = self.payment_status_override {
            notifications.push(OrderNotification::PaymentStatusChanged { status });
        }

        notifications
    }
}

/// Result of a successful transition: the next aggregate and its effects.
#[derive(Debug, Clone)]
pub struct Transition {
    pub aggregate: OrderAggregate,
    pub effects: TransitionEffects,
}

/// Validates transitions against the state table and applies side effects.
#[derive(Debug, Clone, Copy)]
pub struct OrderStateMachine {
    estimated_delivery_minutes: i64,
}

impl Default for OrderStateMachine {
    fn default() -> Self {
        Self::new(DEFAULT_ESTIMATED_DELIVERY_MINUTES)
    }
}

impl OrderStateMachine {
    pub fn new(estimated_delivery_minutes: i64) -> Self {
        Self {
            estimated_delivery_minutes,
        }
    }

    pub fn estimated_delivery_minutes(&self) -> i64 {
        self.estimated_delivery_minutes
    }

    /// Applies `request` to `current`, returning the next aggregate.
    pub fn transition(
        &self,
        current: &OrderAggregate,
        request: &TransitionRequest,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        if current.is_deleted() {
            return Err(OrderError::Deleted);
        }

        let from = current.tracking.state;
        let to = request.target;
        if !from.can_transition_to(to) {
            return Err(OrderError::InvalidStateTransition { from, to });
        }

        let mut next = current.clone();
        let mut effects = TransitionEffects {
            from,
            to,
            shipper_assigned: None,
            released_shipper: None,
            cancellation_reason: None,
            payment_status_override: request.payment_status,
        };

        match to {
            OrderState::Preparing => {
                if let Some(shipper_id) = &request.shipper_id {
                    if shipper_id.is_blank() {
                        return Err(OrderError::MissingField("shipper_id"));
                    }
                    next.order.shipper_id = Some(shipper_id.clone());
                    effects.shipper_assigned = Some(shipper_id.clone());
                }
            }
            OrderState::OnTheWay => {
                if next.order.shipper_id.is_none() {
                    return Err(OrderError::ShipperRequired);
                }
                next.tracking.estimated_delivery_minutes = Some(self.estimated_delivery_minutes);
            }
            OrderState::Delivered => {
                next.tracking.actual_delivery_minutes = Some(current.elapsed_minutes(now));
                if next.tracking.payment_method == PaymentMethod::Cash
                    && next.tracking.payment_status == PaymentStatus::Pending
                {
                    next.tracking.payment_status = PaymentStatus::Paid;
                }
            }
            OrderState::Cancel => {
                let reason = request
                    .cancellation_reason
                    .as_deref()
                    .map(str::trim)
                    .filter(|reason| !reason.is_empty())
                    .ok_or(OrderError::CancellationReasonRequired)?;

                next.tracking.cancellation_reason = Some(reason.to_string());
                if next.tracking.payment_status == PaymentStatus::Paid {
                    next.tracking.payment_status = PaymentStatus::Pending;
                }
                effects.released_shipper = next.order.shipper_id.take();
                effects.cancellation_reason = Some(reason.to_string());
                next.tracking.actual_delivery_minutes = Some(current.elapsed_minutes(now));
            }
            OrderState::WaitingForShipper => {}
        }

        if let Some(status) = request.payment_status {
            next.tracking.payment_status = status;
        }

        next.tracking.state = to;
        next.order.audit.touch(actor, now);

        Ok(Transition {
            aggregate: next,
            effects,
        })
    }

    /// Overrides the payment status without changing the fulfillment state.
    pub fn update_payment_status(
        &self,
        current: &OrderAggregate,
        status: PaymentStatus,
        actor: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Transition, OrderError> {
        if current.is_deleted() {
            return Err(OrderError::Deleted);
        }

        let mut next = current.clone();
        next.tracking.payment_status = status;
        next.order.audit.touch(actor, now);

        let state = current.tracking.state;
        Ok(Transition {
            aggregate: next,
            effects: TransitionEffects {
                from: state,
                to: state,
                shipper_assigned: None,
                released_shipper: None,
                cancellation_reason: None,
                payment_status_override: Some(status),
            },
        })
    }
}

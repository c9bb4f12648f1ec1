//! Notification outbox records.
//!
//! An outbox message is written in the same atomic store call as the order
//! change that produced it, and is delivered later by a relay.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::OrderNotification;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery status of an outbox message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    #[default]
    Pending,
    Delivered,
    /// Gave up after the maximum number of attempts.
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "pending",
            OutboxStatus::Delivered => "delivered",
            OutboxStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OutboxStatus::Pending),
            "delivered" => Ok(OutboxStatus::Delivered),
            "failed" => Ok(OutboxStatus::Failed),
            other => Err(format!("unknown outbox status: {other}")),
        }
    }
}

/// A notification waiting to be fanned out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxMessage {
    pub id: Uuid,
    pub order_id: OrderId,
    pub event: OrderNotification,
    pub status: OutboxStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Audiences that already received this message on an earlier attempt.
    #[serde(default)]
    pub delivered_to: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxMessage {
    /// Creates a pending message for an order event.
    pub fn new(order_id: OrderId, event: OrderNotification) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            event,
            status: OutboxStatus::Pending,
            attempts: 0,
            last_error: None,
            delivered_to: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Creates one pending message per event, preserving order.
    pub fn batch(order_id: &OrderId, events: Vec<OrderNotification>) -> Vec<Self> {
        events
            .into_iter()
            .map(|event| Self::new(order_id.clone(), event))
            .collect()
    }

    /// Records a failed delivery attempt and returns the resulting status.
    ///
    /// `delivered_to` names the audiences the attempt did reach; they are
    /// kept so later attempts only retry the rest.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        delivered_to: &[String],
        max_attempts: u32,
    ) -> OutboxStatus {
        for audience in delivered_to {
            if !self.delivered_to.contains(audience) {
                self.delivered_to.push(audience.clone());
            }
        }
        self.attempts += 1;
        self.last_error = Some(error.into());
        if self.attempts >= max_attempts {
            self.status = OutboxStatus::Failed;
        }
        self.status
    }
}

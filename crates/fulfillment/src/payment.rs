//! Payment validation and capture.
//!
//! The payment method is resolved once into a [`PaymentStrategy`]; validation
//! and capture dispatch on the strategy.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::{CardId, OrderId, UserId};
use domain::{Money, OrderAggregate, OrderError, PaymentMethod};
use rpc::{CardRpc, CardStatus, DEFAULT_RPC_TIMEOUT, with_timeout};
use thiserror::Error;

use crate::{FulfillmentError, Result};

/// How an order is paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentStrategy {
    /// Collected by the shipper on delivery.
    Cash,
    /// Charged to a stored card through the gateway.
    Card,
}

impl PaymentStrategy {
    pub fn for_method(method: PaymentMethod) -> Self {
        if method.is_card() {
            PaymentStrategy::Card
        } else {
            PaymentStrategy::Cash
        }
    }
}

/// Proof of a captured payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub transaction_id: String,
    pub strategy: PaymentStrategy,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("Card charge declined: {0}")]
    Declined(String),

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Card payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charges a card for an order and returns the transaction id.
    async fn charge(
        &self,
        order_id: &OrderId,
        card_id: &CardId,
        amount: Money,
    ) -> std::result::Result<String, GatewayError>;
}

/// Gateway that approves every charge.
#[derive(Debug, Default)]
pub struct SimulatedGateway {
    next_id: AtomicU64,
}

impl SimulatedGateway {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn charge(
        &self,
        order_id: &OrderId,
        card_id: &CardId,
        amount: Money,
    ) -> std::result::Result<String, GatewayError> {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let transaction_id = format!("CARD-{card_id}-{n}");
        tracing::info!(%order_id, %amount, %transaction_id, "Simulated card charge approved");
        Ok(transaction_id)
    }
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    charges: HashMap<OrderId, (CardId, Money, String)>,
    next_id: u32,
    fail_on_charge: bool,
}

/// Recording gateway for tests.
///
/// Charging the same order twice returns the first transaction.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the gateway to decline charges.
    pub fn set_fail_on_charge(&self, fail: bool) {
        self.state
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .fail_on_charge = fail;
    }

    pub fn charge_count(&self) -> usize {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .charges
            .len()
    }

    pub fn has_charge(&self, order_id: &OrderId) -> bool {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .charges
            .contains_key(order_id)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn charge(
        &self,
        order_id: &OrderId,
        card_id: &CardId,
        amount: Money,
    ) -> std::result::Result<String, GatewayError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        if state.fail_on_charge {
            return Err(GatewayError::Declined("insufficient funds".to_string()));
        }
        if let Some((_, _, transaction_id)) = state.charges.get(order_id) {
            return Ok(transaction_id.clone());
        }

        state.next_id += 1;
        let transaction_id = format!("CARD-{card_id}-{}", state.next_id);
        state.charges.insert(
            order_id.clone(),
            (card_id.clone(), amount, transaction_id.clone()),
        );
        Ok(transaction_id)
    }
}

/// Validates payment details before an order is written and captures the
/// payment afterwards.
#[derive(Clone)]
pub struct PaymentProcessor {
    cards: Arc<dyn CardRpc>,
    gateway: Arc<dyn PaymentGateway>,
    timeout: Duration,
}

impl PaymentProcessor {
    pub fn new(cards: Arc<dyn CardRpc>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            cards,
            gateway,
            timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks the payment details without charging anything.
    ///
    /// Card methods need a card that exists, belongs to `user_id` and is active.
    #[tracing::instrument(skip(self))]
    pub async fn validate(
        &self,
        user_id: &UserId,
        method: PaymentMethod,
        card_id: Option<&CardId>,
    ) -> Result<PaymentStrategy> {
        let strategy = PaymentStrategy::for_method(method);
        match strategy {
            PaymentStrategy::Cash => Ok(strategy),
            PaymentStrategy::Card => {
                let card_id = card_id
                    .filter(|id| !id.is_blank())
                    .ok_or(OrderError::CardRequired(method))?;

                let card = with_timeout("card", self.timeout, self.cards.find_by_id(card_id))
                    .await
                    .map_err(FulfillmentError::rpc("looking up card"))?
                    .ok_or_else(|| FulfillmentError::CardNotFound(card_id.clone()))?;

                if card.user_id != *user_id {
                    return Err(FulfillmentError::CardNotOwned(card_id.clone()));
                }
                if card.status != CardStatus::Active {
                    return Err(FulfillmentError::CardInactive(card_id.clone()));
                }
                Ok(strategy)
            }
        }
    }

    /// Captures payment for a persisted order.
    ///
    /// Cash succeeds immediately; the money changes hands on delivery.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn capture(&self, order: &OrderAggregate) -> Result<PaymentReceipt> {
        let method = order.tracking.payment_method;
        let strategy = PaymentStrategy::for_method(method);

        let transaction_id = match strategy {
            PaymentStrategy::Cash => format!("CASH-{}", order.id()),
            PaymentStrategy::Card => {
                let card_id = order
                    .tracking
                    .card_id
                    .as_ref()
                    .ok_or(OrderError::CardRequired(method))?;

                let charge = tokio::time::timeout(
                    self.timeout,
                    self.gateway
                        .charge(order.id(), card_id, order.order.total_price),
                )
                .await;

                match charge {
                    Ok(Ok(transaction_id)) => transaction_id,
                    Ok(Err(e)) => {
                        return Err(FulfillmentError::PaymentCaptureFailed {
                            order_id: order.id().clone(),
                            reason: e.to_string(),
                        });
                    }
                    Err(_) => {
                        return Err(FulfillmentError::PaymentCaptureFailed {
                            order_id: order.id().clone(),
                            reason: format!(
                                "gateway timed out after {}ms",
                                self.timeout.as_millis()
                            ),
                        });
                    }
                }
            }
        };

        Ok(PaymentReceipt {
            transaction_id,
            strategy,
        })
    }
}

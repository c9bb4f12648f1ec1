//! Fulfillment error types.

use common::{CardId, CartId, FoodId, OrderId, RestaurantId};
use domain::OrderError;
use order_store::StoreError;
use rpc::RpcError;
use thiserror::Error;

/// Coarse classification used by callers to pick a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request itself is wrong.
    Validation,
    /// A referenced record does not exist.
    NotFound,
    /// The request conflicts with the current state.
    Conflict,
    /// A collaborator or the store failed.
    Dependency,
}

/// Errors that can occur while creating or managing orders.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    /// Domain rule violation.
    #[error(transparent)]
    Order(#[from] OrderError),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    #[error("Cart {0} does not belong to the requesting user")]
    CartNotOwned(CartId),

    #[error("Cart {0} is empty")]
    EmptyCart(CartId),

    #[error("Cart {0} has already been processed")]
    CartProcessed(CartId),

    #[error("Cart {0} contains items from more than one restaurant")]
    MultiRestaurantCart(CartId),

    #[error("Restaurant not found: {0}")]
    RestaurantNotFound(RestaurantId),

    #[error("Restaurant {0} is not accepting orders")]
    RestaurantInactive(RestaurantId),

    #[error("Food not found: {0}")]
    FoodNotFound(FoodId),

    #[error("Food {0} is not available")]
    FoodInactive(FoodId),

    #[error("Food {food_id} does not belong to restaurant {restaurant_id}")]
    FoodNotInRestaurant {
        food_id: FoodId,
        restaurant_id: RestaurantId,
    },

    #[error("Card not found: {0}")]
    CardNotFound(CardId),

    #[error("Card {0} does not belong to the requesting user")]
    CardNotOwned(CardId),

    #[error("Card {0} is not active")]
    CardInactive(CardId),

    /// The order was persisted but the payment could not be captured.
    #[error("Payment capture failed for order {order_id}: {reason}")]
    PaymentCaptureFailed { order_id: OrderId, reason: String },

    /// A sibling service call failed.
    #[error("{context}: {source}")]
    Rpc {
        context: &'static str,
        #[source]
        source: RpcError,
    },

    /// The order store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl FulfillmentError {
    /// Wraps an RPC error with the operation that issued it.
    pub fn rpc(context: &'static str) -> impl FnOnce(RpcError) -> Self {
        move |source| FulfillmentError::Rpc { context, source }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FulfillmentError::Order(e) => match e {
                OrderError::InvalidStateTransition { .. }
                | OrderError::DeletionNotAllowed(_)
                | OrderError::Deleted => ErrorKind::Conflict,
                _ => ErrorKind::Validation,
            },
            FulfillmentError::OrderNotFound(_)
            | FulfillmentError::CartNotFound(_)
            | FulfillmentError::RestaurantNotFound(_)
            | FulfillmentError::FoodNotFound(_)
            | FulfillmentError::CardNotFound(_) => ErrorKind::NotFound,
            FulfillmentError::CartNotOwned(_)
            | FulfillmentError::EmptyCart(_)
            | FulfillmentError::MultiRestaurantCart(_)
            | FulfillmentError::RestaurantInactive(_)
            | FulfillmentError::FoodInactive(_)
            | FulfillmentError::FoodNotInRestaurant { .. }
            | FulfillmentError::CardNotOwned(_)
            | FulfillmentError::CardInactive(_) => ErrorKind::Validation,
            FulfillmentError::CartProcessed(_) => ErrorKind::Conflict,
            FulfillmentError::PaymentCaptureFailed { .. } | FulfillmentError::Rpc { .. } => {
                ErrorKind::Dependency
            }
            FulfillmentError::Store(e) => match e {
                StoreError::NotFound(_) => ErrorKind::NotFound,
                StoreError::InvalidQuery(_) => ErrorKind::Validation,
                StoreError::ConcurrencyConflict { .. } | StoreError::AlreadyExists(_) => {
                    ErrorKind::Conflict
                }
                _ => ErrorKind::Dependency,
            },
        }
    }

    /// True for transient failures a later retry may get past.
    pub fn is_retryable(&self) -> bool {
        match self {
            FulfillmentError::Rpc { source, .. } => source.is_retryable(),
            FulfillmentError::Store(StoreError::ConcurrencyConflict { .. }) => true,
            FulfillmentError::Store(_) => self.kind() == ErrorKind::Dependency,
            FulfillmentError::PaymentCaptureFailed { .. } => true,
            _ => false,
        }
    }
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;

#[cfg(test)]
mod tests {
    use super::*;
    use domain::OrderState;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            FulfillmentError::from(OrderError::MissingField("cart_id")).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            FulfillmentError::from(OrderError::InvalidStateTransition {
                from: OrderState::Delivered,
                to: OrderState::Cancel
            })
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            FulfillmentError::OrderNotFound(OrderId::new("o1")).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            FulfillmentError::CartProcessed(CartId::new("c1")).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            FulfillmentError::PaymentCaptureFailed {
                order_id: OrderId::new("o1"),
                reason: "declined".to_string()
            }
            .kind(),
            ErrorKind::Dependency
        );
        assert_eq!(
            FulfillmentError::from(StoreError::ConcurrencyConflict {
                order_id: OrderId::new("o1"),
                expected: domain::Version::new(1),
                actual: domain::Version::new(2),
            })
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            FulfillmentError::from(StoreError::InvalidQuery("offset out of range".to_string()))
                .kind(),
            ErrorKind::Validation
        );
    }

    #[test]
    fn test_rpc_errors_keep_context_and_classification() {
        let err = FulfillmentError::rpc("fetching cart items")(RpcError::Timeout {
            service: "cart",
            after_ms: 2000,
        });
        assert_eq!(err.kind(), ErrorKind::Dependency);
        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("fetching cart items:"));

        let fatal = FulfillmentError::rpc("looking up card")(RpcError::Rejected {
            service: "card",
            reason: "forbidden".to_string(),
        });
        assert!(!fatal.is_retryable());
    }
}

use common::OrderId;
use domain::{OrderError, Version};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The order does not exist.
    #[error("Order not found: {0}")]
    NotFound(OrderId),

    /// An order with the same id was already inserted.
    #[error("Order already exists: {0}")]
    AlreadyExists(OrderId),

    /// The stored version did not match the version the writer read.
    #[error(
        "Concurrency conflict for order {order_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        order_id: OrderId,
        expected: Version,
        actual: Version,
    },

    /// The outbox message does not exist.
    #[error("Outbox message not found: {0}")]
    OutboxMessageNotFound(Uuid),

    /// A stored column could not be mapped back into the domain model.
    #[error("Corrupt order record: {0}")]
    Corrupt(#[from] OrderError),

    /// A stored outbox row could not be mapped back.
    #[error("Corrupt outbox record: {0}")]
    CorruptOutbox(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The listing parameters cannot be expressed as a query.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true for errors caused by a stale read rather than a fault.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            StoreError::ConcurrencyConflict { .. } | StoreError::AlreadyExists(_)
        )
    }
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

pub mod error;
pub mod memory;
pub mod outbox;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryOrderStore;
pub use outbox::{OutboxMessage, OutboxStatus};
pub use postgres::PostgresOrderStore;
pub use query::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, OrderPage, OrderQuery};
pub use store::{OrderStore, OrderStoreExt};

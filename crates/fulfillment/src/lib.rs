//! Order fulfillment services.
//!
//! This crate provides:
//! - The order creation saga (validate, convert, check, persist, capture)
//! - Cart conversion, inventory checks and payment processing
//! - The lifecycle service for transitions, reads and soft deletes
//! - The outbox relay and the payment reconciler background workers
//!
//! The creation saga follows these steps:
//! 1. Validate inputs
//! 2. Validate and convert the cart
//! 3. Check inventory
//! 4. Validate payment details
//! 5. Persist the order with its creation notice
//! 6. Capture payment
//! 7. Mark the cart processed and deliver notifications (best-effort)
//!
//! Nothing is written before step 5. A capture failure after it leaves the
//! order in `payment_failed` until the reconciler confirms it.

pub mod conversion;
pub mod error;
pub mod inventory;
pub mod lifecycle;
pub mod outbox_relay;
pub mod payment;
pub mod reconciliation;
pub mod saga;
pub mod services;
pub mod settings;
pub mod worker;

pub use conversion::{CartConversionService, ConvertedCart};
pub use error::{ErrorKind, FulfillmentError, Result};
pub use inventory::InventoryChecker;
pub use lifecycle::OrderLifecycleService;
pub use outbox_relay::{OutboxRelay, RelayReport};
pub use payment::{
    GatewayError, InMemoryPaymentGateway, PaymentGateway, PaymentProcessor, PaymentReceipt,
    PaymentStrategy, SimulatedGateway,
};
pub use reconciliation::{PaymentReconciler, ReconcileReport};
pub use saga::{CreateOrderRequest, OrderCreationSaga};
pub use services::{Collaborators, FulfillmentCore};
pub use settings::FulfillmentSettings;
pub use worker::WorkerHandle;

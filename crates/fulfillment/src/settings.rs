use std::time::Duration;

use domain::DEFAULT_ESTIMATED_DELIVERY_MINUTES;
use rpc::DEFAULT_RPC_TIMEOUT;

/// Tunables shared by the saga, the lifecycle service and the workers.
#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    /// Deadline for each outbound RPC call.
    pub rpc_timeout: Duration,
    /// Estimate recorded when an order goes on the way.
    pub estimated_delivery_minutes: i64,
    /// Delivery attempts before an outbox message is marked failed.
    pub outbox_max_attempts: u32,
    /// Messages handled per relay sweep.
    pub outbox_batch_size: usize,
    pub outbox_poll_interval: Duration,
    /// How old a `payment_pending` order must be before reconciliation
    /// considers its saga abandoned.
    pub reconcile_grace_period: Duration,
    pub reconcile_batch_size: usize,
    pub reconcile_interval: Duration,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            estimated_delivery_minutes: DEFAULT_ESTIMATED_DELIVERY_MINUTES,
            outbox_max_attempts: 5,
            outbox_batch_size: 100,
            outbox_poll_interval: Duration::from_secs(5),
            reconcile_grace_period: Duration::from_secs(300),
            reconcile_batch_size: 100,
            reconcile_interval: Duration::from_secs(60),
        }
    }
}

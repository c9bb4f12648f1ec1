//! Retries payment capture for orders whose saga did not confirm.

use std::time::Duration;

use chrono::Utc;
use domain::{OrderAggregate, OrderState, SagaStatus};
use metrics::counter;
use order_store::{OrderQuery, OrderStore, OrderStoreExt};
use tracing::{debug, info, warn};

use crate::saga::settle_capture;
use crate::worker::{WorkerHandle, spawn_periodic};
use crate::{FulfillmentSettings, OutboxRelay, PaymentProcessor, Result};

/// Outcome of a reconciliation sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: usize,
    /// Capture failed again; retried on the next sweep.
    pub still_failing: usize,
    /// Cancelled, deleted or concurrently changed orders.
    pub skipped: usize,
}

/// Sweeps `payment_failed` orders and stale `payment_pending` orders.
#[derive(Clone)]
pub struct PaymentReconciler<S> {
    store: S,
    payments: PaymentProcessor,
    relay: OutboxRelay<S>,
    grace_period: chrono::Duration,
    batch_size: usize,
}

impl<S> PaymentReconciler<S>
where
    S: OrderStore + Clone + 'static,
{
    pub fn new(
        store: S,
        payments: PaymentProcessor,
        relay: OutboxRelay<S>,
        settings: &FulfillmentSettings,
    ) -> Self {
        Self {
            store,
            payments,
            relay,
            grace_period: chrono::Duration::from_std(settings.reconcile_grace_period)
                .unwrap_or_else(|_| chrono::Duration::days(365)),
            batch_size: settings.reconcile_batch_size.max(1),
        }
    }

    /// Runs one sweep.
    ///
    /// A `payment_pending` order only qualifies once it is older than the
    /// grace period, so sagas still in flight are left alone.
    #[tracing::instrument(skip(self))]
    pub async fn reconcile_once(&self) -> Result<ReconcileReport> {
        let failed = self
            .store
            .list(
                OrderQuery::new()
                    .saga_statuses(vec![SagaStatus::PaymentFailed])
                    .limit(self.batch_size),
            )
            .await?;
        let stale = self
            .store
            .list(
                OrderQuery::new()
                    .saga_statuses(vec![SagaStatus::PaymentPending])
                    .created_before(Utc::now() - self.grace_period)
                    .limit(self.batch_size),
            )
            .await?;

        let mut report = ReconcileReport::default();
        for order in failed.orders.iter().chain(stale.orders.iter()) {
            let Some(current) = self.store.find_by_id(&order.id).await? else {
                report.skipped += 1;
                continue;
            };
            if current.is_deleted() || current.state() == OrderState::Cancel {
                debug!(order_id = %order.id, "Skipping order that no longer needs payment");
                report.skipped += 1;
                continue;
            }
            self.reconcile(&current, &mut report).await?;
        }

        if report != ReconcileReport::default() {
            info!(
                confirmed = report.confirmed,
                still_failing = report.still_failing,
                skipped = report.skipped,
                "Payment reconciliation finished"
            );
        }
        Ok(report)
    }

    /// Runs a sweep every `interval` until the handle is stopped.
    pub fn spawn(self, interval: Duration) -> WorkerHandle {
        spawn_periodic("payment_reconciler", interval, move || {
            let reconciler = self.clone();
            async move {
                if let Err(e) = reconciler.reconcile_once().await {
                    tracing::error!(error = %e, "Payment reconciliation failed");
                }
            }
        })
    }

    async fn reconcile(&self, current: &OrderAggregate, report: &mut ReconcileReport) -> Result<()> {
        let captured = match self.payments.capture(current).await {
            Ok(receipt) => {
                debug!(order_id = %current.id(), transaction_id = %receipt.transaction_id, "Capture retried");
                true
            }
            Err(e) => {
                warn!(order_id = %current.id(), error = %e, "Capture still failing");
                false
            }
        };

        if !captured && current.order.saga_status == SagaStatus::PaymentFailed {
            report.still_failing += 1;
            return Ok(());
        }

        let (next, outbox) = settle_capture(current, captured, Utc::now());
        match self.store.save(current, &next, outbox).await {
            Ok(_) => {}
            Err(e) if e.is_conflict() => {
                debug!(order_id = %current.id(), "Order changed during reconciliation");
                report.skipped += 1;
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        if captured {
            counter!("payment_reconciled_total").increment(1);
            report.confirmed += 1;
            if let Err(e) = self.relay.deliver_for_order(current.id()).await {
                warn!(order_id = %current.id(), error = %e, "Notification delivery deferred to relay");
            }
        } else {
            report.still_failing += 1;
        }
        Ok(())
    }
}

//! Wiring of the fulfillment services around one order store.

use std::sync::Arc;

use domain::OrderStateMachine;
use notification::{NotificationChannel, NotificationFanout, RecipientResolver};
use order_store::OrderStore;
use rpc::{CardRpc, CartRpc, FoodRpc, RestaurantRpc, UserRpc};

use crate::worker::WorkerHandle;
use crate::{
    CartConversionService, FulfillmentSettings, InventoryChecker, OrderCreationSaga,
    OrderLifecycleService, OutboxRelay, PaymentGateway, PaymentProcessor, PaymentReconciler,
};

/// Sibling services and outbound adapters used by the core.
#[derive(Clone)]
pub struct Collaborators {
    pub carts: Arc<dyn CartRpc>,
    pub foods: Arc<dyn FoodRpc>,
    pub restaurants: Arc<dyn RestaurantRpc>,
    pub cards: Arc<dyn CardRpc>,
    pub users: Arc<dyn UserRpc>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub channel: Arc<dyn NotificationChannel>,
}

/// The saga, the lifecycle service and the background workers, sharing
/// one store and one set of collaborators.
#[derive(Clone)]
pub struct FulfillmentCore<S> {
    pub saga: OrderCreationSaga<S>,
    pub lifecycle: OrderLifecycleService<S>,
    pub relay: OutboxRelay<S>,
    pub reconciler: PaymentReconciler<S>,
    store: S,
    settings: FulfillmentSettings,
}

impl<S> FulfillmentCore<S>
where
    S: OrderStore + Clone + 'static,
{
    pub fn new(store: S, collaborators: Collaborators, settings: FulfillmentSettings) -> Self {
        let timeout = settings.rpc_timeout;

        let resolver = RecipientResolver::new(
            Arc::clone(&collaborators.users),
            Arc::clone(&collaborators.restaurants),
        )
        .with_timeout(timeout);
        let fanout = NotificationFanout::new(collaborators.channel, resolver);
        let relay = OutboxRelay::new(store.clone(), fanout, &settings);

        let conversion = CartConversionService::new(
            Arc::clone(&collaborators.carts),
            Arc::clone(&collaborators.foods),
            Arc::clone(&collaborators.restaurants),
        )
        .with_timeout(timeout);
        let inventory = InventoryChecker::new(collaborators.restaurants, collaborators.foods)
            .with_timeout(timeout);
        let payments =
            PaymentProcessor::new(collaborators.cards, collaborators.gateway).with_timeout(timeout);

        let saga = OrderCreationSaga::new(
            store.clone(),
            conversion,
            inventory,
            payments.clone(),
            collaborators.carts,
            relay.clone(),
            settings.clone(),
        );
        let lifecycle = OrderLifecycleService::new(
            store.clone(),
            OrderStateMachine::new(settings.estimated_delivery_minutes),
            relay.clone(),
        );
        let reconciler = PaymentReconciler::new(store.clone(), payments, relay.clone(), &settings);

        Self {
            saga,
            lifecycle,
            relay,
            reconciler,
            store,
            settings,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn settings(&self) -> &FulfillmentSettings {
        &self.settings
    }

    /// Starts the outbox relay and the payment reconciler.
    pub fn spawn_workers(&self) -> Vec<WorkerHandle> {
        vec![
            self.relay.clone().spawn(self.settings.outbox_poll_interval),
            self.reconciler
                .clone()
                .spawn(self.settings.reconcile_interval),
        ]
    }
}

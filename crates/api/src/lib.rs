//! HTTP API server with observability for the order fulfillment core.
//!
//! Provides REST endpoints for order creation and lifecycle management,
//! with structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod demo;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch};
use fulfillment::{Collaborators, FulfillmentCore, FulfillmentSettings};
use metrics_exporter_prometheus::PrometheusHandle;
use order_store::OrderStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::orders::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: OrderStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route(
            "/orders",
            get(routes::orders::list::<S>).post(routes::orders::create::<S>),
        )
        .route(
            "/orders/{id}",
            get(routes::orders::get::<S>).delete(routes::orders::delete::<S>),
        )
        .route(
            "/orders/{id}/state",
            patch(routes::orders::transition::<S>),
        )
        .route(
            "/orders/{id}/payment-status",
            patch(routes::orders::update_payment_status::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state around a store and its collaborators.
pub fn create_state<S: OrderStore + Clone + 'static>(
    store: S,
    collaborators: Collaborators,
    settings: FulfillmentSettings,
) -> Arc<AppState<S>> {
    Arc::new(AppState {
        fulfillment: FulfillmentCore::new(store, collaborators, settings),
    })
}

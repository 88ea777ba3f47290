//! HTTP API server with observability for the workshop CRM.
//!
//! Provides REST endpoints for materials, products, orders and expenses, with
//! structured logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use metrics_exporter_prometheus::PrometheusHandle;
use services::{CatalogService, ExpenseService, OrderService, ServiceConfig};
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub orders: OrderService<S>,
    pub catalog: CatalogService<S>,
    pub expenses: ExpenseService<S>,
}

/// Creates the application state with every service over one store.
pub fn create_state<S: Store + Clone>(store: S, config: ServiceConfig) -> Arc<AppState<S>> {
    Arc::new(AppState {
        orders: OrderService::new(store.clone(), config),
        catalog: CatalogService::new(store.clone()),
        expenses: ExpenseService::new(store),
    })
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    use routes::{expenses, materials, orders, products};

    let metrics_router = Router::new()
        .route("/metrics", get(routes::health::metrics))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/materials",
            post(materials::create::<S>).get(materials::list::<S>),
        )
        .route(
            "/materials/{id}",
            get(materials::get::<S>)
                .patch(materials::update::<S>)
                .delete(materials::delete::<S>),
        )
        .route("/materials/{id}/stock", post(materials::adjust_stock::<S>))
        .route(
            "/products",
            post(products::create::<S>).get(products::list::<S>),
        )
        .route(
            "/products/{id}",
            get(products::get::<S>)
                .patch(products::update::<S>)
                .delete(products::delete::<S>),
        )
        .route("/products/{id}/materials", post(products::add_bom_entry::<S>))
        .route(
            "/products/{id}/materials/{entry_id}",
            patch(products::update_bom_entry::<S>).delete(products::remove_bom_entry::<S>),
        )
        .route("/products/{id}/prices", post(products::add_price_tier::<S>))
        .route(
            "/products/{id}/prices/{tier_id}",
            patch(products::update_price_tier::<S>).delete(products::remove_price_tier::<S>),
        )
        .route("/orders", post(orders::create::<S>).get(orders::list::<S>))
        .route("/orders/{id}", get(orders::get::<S>))
        .route(
            "/orders/{id}/lines",
            post(orders::add_line::<S>).put(orders::set_lines::<S>),
        )
        .route(
            "/orders/{id}/lines/{line_id}",
            patch(orders::change_line_quantity::<S>).delete(orders::remove_line::<S>),
        )
        .route("/orders/{id}/costs", post(orders::add_cost::<S>))
        .route(
            "/orders/{id}/costs/{cost_id}",
            axum::routing::delete(orders::remove_cost::<S>),
        )
        .route("/orders/{id}/confirm", post(orders::confirm::<S>))
        .route("/orders/{id}/payments", post(orders::record_payment::<S>))
        .route(
            "/orders/{id}/materials",
            patch(orders::adjust_material_usage::<S>),
        )
        .route("/orders/{id}/ready", post(orders::mark_ready::<S>))
        .route("/orders/{id}/ship", post(orders::mark_shipped::<S>))
        .route("/orders/{id}/complete", post(orders::complete::<S>))
        .route("/orders/{id}/cancel", post(orders::cancel::<S>))
        .route(
            "/expenses",
            post(expenses::create::<S>).get(expenses::list::<S>),
        )
        .route(
            "/expenses/{id}",
            get(expenses::get::<S>)
                .patch(expenses::update::<S>)
                .delete(expenses::delete::<S>),
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

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use tower_http::timeout::TimeoutLayer;

use crate::auth::WebhookAuth;
use crate::catalog::CategoryCatalog;
use crate::dispatcher::Dispatcher;
use crate::handlers;
use crate::routing::RoutingTable;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub routes: Arc<RoutingTable>,
    pub catalog: Arc<CategoryCatalog>,
    pub webhook_auth: WebhookAuth,
    /// Bearer token for `/api/v1`. The admin API refuses every request when unset.
    pub admin_token: Option<String>,
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let api_v1 = Router::new()
        .route("/routes", get(handlers::v1::list_routes))
        .route(
            "/routes/{scope}",
            put(handlers::v1::set_route).delete(handlers::v1::remove_route),
        );

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .route("/health", get(handlers::health))
        .route("/webhook", post(handlers::receive_event))
        .route("/webhook/listing", post(handlers::receive_listing))
        .nest("/api/v1", api_v1)
        .with_state(state)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(request_timeout_secs),
        ))
}

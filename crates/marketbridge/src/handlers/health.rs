use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use crate::catalog::CategoryCatalog;
use crate::event::EventKind;
use crate::routing::RoutingState;
use crate::server::AppState;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

pub async fn readyz() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    webhook_auth: bool,
    routes: RoutingState,
    categories: CategoryCatalog,
    event_types: Vec<&'static str>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        webhook_auth: state.webhook_auth.is_enabled(),
        routes: state.routes.snapshot().await,
        categories: state.catalog.as_ref().clone(),
        event_types: EventKind::ALL.iter().map(|k| k.as_str()).collect(),
    })
}

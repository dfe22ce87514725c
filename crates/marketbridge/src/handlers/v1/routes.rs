//! Routing table administration over HTTP.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::verify_bearer;
use crate::response;
use crate::routing::{RoutingState, ScopeRoutes};
use crate::server::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct SetRouteRequest {
    destination_id: String,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
pub struct RemoveRouteQuery {
    #[serde(default)]
    category: Option<String>,
}

#[derive(Serialize)]
pub struct ListRoutesResponse {
    success: bool,
    routes: RoutingState,
}

#[derive(Serialize)]
pub struct ScopeRoutesResponse {
    success: bool,
    scope: String,
    routes: ScopeRoutes,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/routes
pub async fn list_routes(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }
    let response = ListRoutesResponse {
        success: true,
        routes: state.routes.snapshot().await,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// PUT /api/v1/routes/{scope}
pub async fn set_route(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    headers: HeaderMap,
    Json(req): Json<SetRouteRequest>,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let destination_id = req.destination_id.trim();
    if destination_id.is_empty() {
        return response::bad_request("destination_id must not be empty").into_response();
    }
    let category = normalize(req.category.as_deref());
    if let Some(code) = category
        && !state.catalog.contains(code)
    {
        return response::bad_request(format!("unknown category '{code}'")).into_response();
    }

    if let Err(e) = state.routes.configure(&scope, destination_id, category).await {
        return response::internal_error(format!("route applied but not saved: {e}"))
            .into_response();
    }
    info!(%scope, destination = destination_id, category = ?category, "Route set via API");

    let routes = state
        .routes
        .snapshot()
        .await
        .scopes
        .remove(&scope)
        .unwrap_or_default();
    let response = ScopeRoutesResponse {
        success: true,
        scope,
        routes,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// DELETE /api/v1/routes/{scope}
pub async fn remove_route(
    State(state): State<AppState>,
    Path(scope): Path<String>,
    Query(query): Query<RemoveRouteQuery>,
    headers: HeaderMap,
) -> Response {
    if let Err(denied) = authorize(&state, &headers) {
        return denied;
    }

    let category = normalize(query.category.as_deref());
    match state.routes.remove(&scope, category).await {
        Ok(true) => {
            info!(%scope, category = ?category, "Route removed via API");
            let routes = state
                .routes
                .snapshot()
                .await
                .scopes
                .remove(&scope)
                .unwrap_or_default();
            let response = ScopeRoutesResponse {
                success: true,
                scope,
                routes,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(false) => response::not_found(format!("no matching route for scope '{scope}'"))
            .into_response(),
        Err(e) => response::internal_error(format!("route removed but not saved: {e}"))
            .into_response(),
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), Response> {
    let Some(token) = state.admin_token.as_deref() else {
        return Err(response::forbidden("admin API is disabled").into_response());
    };
    if verify_bearer(headers, Some(token)) {
        Ok(())
    } else {
        Err(response::unauthorized("invalid admin token").into_response())
    }
}

fn normalize(category: Option<&str>) -> Option<&str> {
    category.map(str::trim).filter(|c| !c.is_empty())
}

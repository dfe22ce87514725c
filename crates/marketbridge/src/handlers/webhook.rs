//! Inbound webhook from the marketplace backend.

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use marketbridge_protocol::ThreadHandle;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::dispatcher::{DeliveryOutcome, DispatchError, DispatchResult};
use crate::event::{Envelope, EventKind};
use crate::response;
use crate::server::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct WebhookResponse {
    success: bool,
    event_type: EventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    result: DispatchSummary,
}

#[derive(Serialize)]
pub struct DispatchSummary {
    attempted: usize,
    succeeded: usize,
    outcomes: Vec<DeliveryOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    threads: Vec<ThreadHandle>,
}

impl From<DispatchResult> for WebhookResponse {
    fn from(result: DispatchResult) -> Self {
        let success = result.is_success();
        let error = (!success).then(|| format!("all {} deliveries failed", result.attempted));
        let threads = result.threads().cloned().collect();
        Self {
            success,
            event_type: result.event_kind,
            error,
            result: DispatchSummary {
                attempted: result.attempted,
                succeeded: result.succeeded,
                outcomes: result.outcomes,
                threads,
            },
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /webhook
///
/// Accepts an `{event_type, data}` envelope or a bare listing object.
pub async fn receive_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body = match authenticate_and_parse(&state, &headers, &body) {
        Ok(body) => body,
        Err(response) => return response,
    };
    match Envelope::from_body(body) {
        Ok(envelope) => dispatch(&state, envelope).await,
        Err(reason) => {
            warn!(%reason, "Rejected webhook body");
            response::bad_request(reason.to_string()).into_response()
        }
    }
}

/// POST /webhook/listing
///
/// Older backends post the listing object directly here.
pub async fn receive_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    match authenticate_and_parse(&state, &headers, &body) {
        Ok(body) => dispatch(&state, Envelope::legacy_listing(body)).await,
        Err(response) => response,
    }
}

fn authenticate_and_parse(
    state: &AppState,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Value, Response> {
    if !state.webhook_auth.verify(headers) {
        warn!("Webhook rejected: missing or wrong shared secret");
        return Err(response::unauthorized("invalid webhook secret").into_response());
    }
    serde_json::from_slice(body)
        .map_err(|e| response::bad_request(format!("invalid JSON body: {e}")).into_response())
}

/// Runs the dispatch on its own task. A request timeout drops only this wait;
/// deliveries already started run to completion.
async fn dispatch(state: &AppState, envelope: Envelope) -> Response {
    info!(event_type = %envelope.event_type, scope = ?envelope.scope, "Webhook received");
    let dispatcher = state.dispatcher.clone();
    let task = tokio::spawn(async move { dispatcher.dispatch_envelope(&envelope).await });
    let outcome = match task.await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Dispatch task failed");
            return response::internal_error("dispatch failed").into_response();
        }
    };
    match outcome {
        Ok(result) => (StatusCode::OK, Json(WebhookResponse::from(result))).into_response(),
        Err(DispatchError::Rejected(reason)) => {
            response::bad_request(reason.to_string()).into_response()
        }
        Err(DispatchError::DeliveryFailed(result)) => {
            (StatusCode::BAD_GATEWAY, Json(WebhookResponse::from(result))).into_response()
        }
    }
}

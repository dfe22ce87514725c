//! Event dispatch.
//!
//! One dispatch moves an event through
//! `Received -> Validated -> Resolved -> Delivering -> Completed`, or stops at
//! `Rejected` when the envelope does not describe a known event. Deliveries to
//! different targets run concurrently and fail independently; the dispatch
//! succeeds when at least one target succeeded or there was nothing to do.

use std::fmt;
use std::sync::Arc;

use futures::future::join_all;
use marketbridge_protocol::{DeliveryError, DeliveryGateway, Message, ThreadHandle, ThreadVisibility};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::event::{DisputePayload, Envelope, Event, EventKind, RejectReason};
use crate::format::{MessageFormatter, dispute_thread_name};
use crate::resolver::{DestinationResolver, ResolvedTarget, Route};

// ============================================================================
// Types
// ============================================================================

/// Dispatch lifecycle, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    Received,
    Validated,
    Resolved,
    Delivering,
    Completed,
    Rejected,
}

impl fmt::Display for DispatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchState::Received => "received",
            DispatchState::Validated => "validated",
            DispatchState::Resolved => "resolved",
            DispatchState::Delivering => "delivering",
            DispatchState::Completed => "completed",
            DispatchState::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// A secondary operation that failed without failing its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SideEffectFailure {
    /// e.g. `add_member:buyer`.
    pub operation: String,
    pub error: String,
}

/// Result of delivering to one target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryOutcome {
    pub target: ResolvedTarget,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Thread created for this target, even when posting into it failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread: Option<ThreadHandle>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub side_effect_failures: Vec<SideEffectFailure>,
}

impl DeliveryOutcome {
    fn delivered(target: ResolvedTarget, message_id: String) -> Self {
        Self {
            target,
            success: true,
            error: None,
            message_id: Some(message_id),
            thread: None,
            side_effect_failures: Vec::new(),
        }
    }

    fn failed(target: ResolvedTarget, error: &DeliveryError) -> Self {
        Self {
            target,
            success: false,
            error: Some(error.to_string()),
            message_id: None,
            thread: None,
            side_effect_failures: Vec::new(),
        }
    }
}

/// Aggregate of all delivery outcomes for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    pub event_kind: EventKind,
    pub attempted: usize,
    pub succeeded: usize,
    pub outcomes: Vec<DeliveryOutcome>,
}

impl DispatchResult {
    fn from_outcomes(event_kind: EventKind, outcomes: Vec<DeliveryOutcome>) -> Self {
        Self {
            event_kind,
            attempted: outcomes.len(),
            succeeded: outcomes.iter().filter(|o| o.success).count(),
            outcomes,
        }
    }

    /// At least one delivery succeeded, or none was needed.
    pub fn is_success(&self) -> bool {
        self.attempted == 0 || self.succeeded > 0
    }

    /// Threads created during this dispatch.
    pub fn threads(&self) -> impl Iterator<Item = &ThreadHandle> {
        self.outcomes.iter().filter_map(|o| o.thread.as_ref())
    }
}

/// Why a dispatch did not succeed.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("event rejected: {0}")]
    Rejected(#[from] RejectReason),

    #[error("all {} deliveries failed", .0.attempted)]
    DeliveryFailed(DispatchResult),
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Runs events through resolution, formatting and delivery.
#[derive(Clone)]
pub struct Dispatcher {
    resolver: DestinationResolver,
    formatter: MessageFormatter,
    gateway: Arc<dyn DeliveryGateway>,
    thread_visibility: ThreadVisibility,
}

impl Dispatcher {
    pub fn new(
        resolver: DestinationResolver,
        formatter: MessageFormatter,
        gateway: Arc<dyn DeliveryGateway>,
    ) -> Self {
        Self {
            resolver,
            formatter,
            gateway,
            thread_visibility: ThreadVisibility::default(),
        }
    }

    pub fn with_thread_visibility(mut self, visibility: ThreadVisibility) -> Self {
        self.thread_visibility = visibility;
        self
    }

    /// Validate an envelope and dispatch the event it carries.
    pub async fn dispatch_envelope(
        &self,
        envelope: &Envelope,
    ) -> Result<DispatchResult, DispatchError> {
        debug!(state = %DispatchState::Received, event_type = %envelope.event_type);
        let event = match Event::from_envelope(envelope) {
            Ok(event) => event,
            Err(reason) => {
                warn!(state = %DispatchState::Rejected, %reason, "Rejected inbound event");
                return Err(reason.into());
            }
        };
        self.dispatch(&event).await
    }

    /// Dispatch an already validated event.
    pub async fn dispatch(&self, event: &Event) -> Result<DispatchResult, DispatchError> {
        let kind = event.kind();
        debug!(state = %DispatchState::Validated, event_kind = %kind);

        let message = self.formatter.format(event);
        let outcomes = match event {
            Event::ListingCreated(_) | Event::ListingUpdated(_) => {
                let targets = self.resolve(event).await;
                self.send_all(targets, &message).await
            }
            Event::DisputeCreated(dispute) => {
                let targets = self.resolve(event).await;
                self.open_dispute_threads(targets, dispute, &message).await
            }
            Event::DisputeUpdated(_) | Event::DisputeResolved(_) => {
                self.thread_then_channels(event, &message).await
            }
        };

        let result = DispatchResult::from_outcomes(kind, outcomes);
        if result.is_success() {
            info!(
                state = %DispatchState::Completed,
                event_kind = %kind,
                attempted = result.attempted,
                succeeded = result.succeeded,
                "Dispatched event"
            );
            Ok(result)
        } else {
            error!(
                state = %DispatchState::Completed,
                event_kind = %kind,
                attempted = result.attempted,
                "Every delivery failed"
            );
            Err(DispatchError::DeliveryFailed(result))
        }
    }

    async fn resolve(&self, event: &Event) -> Vec<ResolvedTarget> {
        let targets = self.resolver.resolve_targets(event).await;
        debug!(state = %DispatchState::Resolved, targets = targets.len());
        targets
    }

    async fn send_all(
        &self,
        targets: Vec<ResolvedTarget>,
        message: &Message,
    ) -> Vec<DeliveryOutcome> {
        if !targets.is_empty() {
            debug!(state = %DispatchState::Delivering, gateway = self.gateway.name());
        }
        join_all(targets.into_iter().map(|t| self.send_one(t, message))).await
    }

    async fn send_one(&self, target: ResolvedTarget, message: &Message) -> DeliveryOutcome {
        match self
            .gateway
            .send_message(&target.destination_id, message)
            .await
        {
            Ok(sent) => DeliveryOutcome::delivered(target, sent.message_id),
            Err(e) => {
                warn!(
                    scope = %target.scope,
                    destination = %target.destination_id,
                    error = %e,
                    "Delivery failed"
                );
                DeliveryOutcome::failed(target, &e)
            }
        }
    }

    /// Post into the thread the backend remembered, falling back to the
    /// routed channels when there is none or posting there fails.
    async fn thread_then_channels(
        &self,
        event: &Event,
        message: &Message,
    ) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::new();

        if let Some(thread_id) = event.known_thread() {
            let target = ResolvedTarget {
                scope: event.scope().unwrap_or_default().to_string(),
                destination_id: thread_id.to_string(),
                route: Route::Thread,
            };
            debug!(
                state = %DispatchState::Delivering,
                thread = thread_id,
                "Posting to known thread"
            );
            let outcome = self.send_one(target, message).await;
            if outcome.success {
                return vec![outcome];
            }
            warn!(thread = thread_id, "Known thread unusable, falling back to channel routes");
            outcomes.push(outcome);
        }

        let targets = self.resolve(event).await;
        outcomes.extend(self.send_all(targets, message).await);
        outcomes
    }

    async fn open_dispute_threads(
        &self,
        targets: Vec<ResolvedTarget>,
        dispute: &DisputePayload,
        message: &Message,
    ) -> Vec<DeliveryOutcome> {
        if !targets.is_empty() {
            debug!(state = %DispatchState::Delivering, gateway = self.gateway.name());
        }
        let name = dispute_thread_name(dispute);
        join_all(
            targets
                .into_iter()
                .map(|t| self.open_dispute_thread(t, &name, dispute, message)),
        )
        .await
    }

    /// Create the dispute thread, post the summary into it, then invite the
    /// parties. Invitations never change the outcome.
    async fn open_dispute_thread(
        &self,
        target: ResolvedTarget,
        name: &str,
        dispute: &DisputePayload,
        message: &Message,
    ) -> DeliveryOutcome {
        let thread = match self
            .gateway
            .create_thread(&target.destination_id, name, self.thread_visibility)
            .await
        {
            Ok(thread) => thread,
            Err(e) => {
                warn!(
                    scope = %target.scope,
                    channel = %target.destination_id,
                    error = %e,
                    "Thread creation failed"
                );
                return DeliveryOutcome::failed(target, &e);
            }
        };
        info!(scope = %target.scope, thread = %thread.id, "Opened dispute thread");

        let mut outcome = match self.gateway.send_message(&thread.id, message).await {
            Ok(sent) => DeliveryOutcome::delivered(target, sent.message_id),
            Err(e) => {
                warn!(thread = %thread.id, error = %e, "Posting dispute summary failed");
                DeliveryOutcome::failed(target, &e)
            }
        };

        let parties = [
            ("buyer", dispute.buyer_discord_id.as_deref()),
            ("seller", dispute.seller_discord_id.as_deref()),
        ];
        let invites = parties
            .into_iter()
            .filter_map(|(party, id)| id.map(|id| (party, id)))
            .map(|(party, user_id)| {
                let thread = &thread;
                async move {
                    self.gateway
                        .add_member(thread, user_id)
                        .await
                        .map_err(|e| (party, user_id, e))
                }
            });
        for result in join_all(invites).await {
            if let Err((party, user_id, e)) = result {
                warn!(
                    thread = %thread.id,
                    party,
                    user_id,
                    error = %e,
                    "Could not add thread member"
                );
                outcome.side_effect_failures.push(SideEffectFailure {
                    operation: format!("add_member:{party}"),
                    error: e.to_string(),
                });
            }
        }

        outcome.thread = Some(thread);
        outcome
    }
}

//! Destination resolution.
//!
//! Events carrying a category go only to that category's route in each scope;
//! a scope without one is skipped, never sent to its general channel. Events
//! without a category go to each scope's general route.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::event::Event;
use crate::routing::RoutingLookup;

/// How a target was reached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "category", rename_all = "snake_case")]
pub enum Route {
    /// The scope's route for this category.
    Category(String),
    /// The scope's general route.
    General,
    /// A thread id supplied by the backend.
    Thread,
}

/// A destination chosen for one dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub scope: String,
    pub destination_id: String,
    pub route: Route,
}

/// Picks destinations for events from the routing table.
#[derive(Clone)]
pub struct DestinationResolver {
    routes: Arc<dyn RoutingLookup>,
}

impl DestinationResolver {
    pub fn new(routes: Arc<dyn RoutingLookup>) -> Self {
        Self { routes }
    }

    /// One target per scope that has a matching route.
    ///
    /// When the event names a scope only that scope is considered; otherwise
    /// every configured scope is.
    pub async fn resolve_targets(&self, event: &Event) -> Vec<ResolvedTarget> {
        let category = event.category();
        let scopes = match event.scope() {
            Some(scope) => vec![scope.to_string()],
            None => self.routes.scopes().await,
        };

        let mut targets = Vec::with_capacity(scopes.len());
        for scope in scopes {
            match self.routes.resolve(&scope, category).await {
                Some(destination_id) => targets.push(ResolvedTarget {
                    scope,
                    destination_id,
                    route: match category {
                        Some(c) => Route::Category(c.to_string()),
                        None => Route::General,
                    },
                }),
                None => debug!(%scope, category = ?category, "No route for scope"),
            }
        }

        if targets.is_empty() {
            warn!(
                event_kind = %event.kind(),
                category = category.unwrap_or("-"),
                "No destination configured, dropping event"
            );
        }
        targets
    }
}

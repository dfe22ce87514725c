//! Routing table: (scope, category) to destination.
//!
//! Each scope (a Discord guild) has an optional general destination and a map
//! of per-category destinations. Lookups never fall back across the two: a
//! category lookup only sees the category map.
//!
//! The table is an in-memory cache over a [`RoutingStore`]. Reads take a
//! shared lock; writes take the exclusive lock for the whole
//! update-then-persist step, so concurrent configuration never loses an
//! update and the store always receives states in the order they were applied.

mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use store::{FileRoutingStore, MemoryRoutingStore, RoutingStore, StoreError, StoreResult};

// ============================================================================
// State
// ============================================================================

/// Routes for a single scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeRoutes {
    /// General destination, used for events without a category.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Category code to destination.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub categories: BTreeMap<String, String>,
}

impl ScopeRoutes {
    fn is_empty(&self) -> bool {
        self.channel_id.is_none() && self.categories.is_empty()
    }
}

/// The complete routing state, keyed by scope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingState {
    pub scopes: BTreeMap<String, ScopeRoutes>,
}

impl RoutingState {
    pub fn resolve(&self, scope: &str, category: Option<&str>) -> Option<&str> {
        let routes = self.scopes.get(scope)?;
        match category {
            Some(category) => routes.categories.get(category).map(String::as_str),
            None => routes.channel_id.as_deref(),
        }
    }

    fn configure(&mut self, scope: &str, destination_id: &str, category: Option<&str>) {
        let routes = self.scopes.entry(scope.to_string()).or_default();
        match category {
            Some(category) => {
                routes
                    .categories
                    .insert(category.to_string(), destination_id.to_string());
            }
            None => routes.channel_id = Some(destination_id.to_string()),
        }
    }

    fn remove(&mut self, scope: &str, category: Option<&str>) -> bool {
        let Some(routes) = self.scopes.get_mut(scope) else {
            return false;
        };
        let removed = match category {
            Some(category) => routes.categories.remove(category).is_some(),
            None => routes.channel_id.take().is_some(),
        };
        if routes.is_empty() {
            self.scopes.remove(scope);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

/// A route to seed at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BootstrapRoute {
    pub scope: String,
    #[serde(default)]
    pub channel_id: Option<String>,
    #[serde(default)]
    pub categories: BTreeMap<String, String>,
}

// ============================================================================
// RoutingLookup
// ============================================================================

/// Read side of the routing table, as seen by the resolver.
#[async_trait]
pub trait RoutingLookup: Send + Sync {
    /// Destination for `(scope, category)`; no cross-fallback.
    async fn resolve(&self, scope: &str, category: Option<&str>) -> Option<String>;

    /// Every scope with at least one route.
    async fn scopes(&self) -> Vec<String>;
}

// ============================================================================
// RoutingTable
// ============================================================================

/// Shared, persisted routing table.
pub struct RoutingTable {
    state: RwLock<RoutingState>,
    store: Arc<dyn RoutingStore>,
}

impl RoutingTable {
    /// Load the table from its store.
    ///
    /// An unreadable or corrupt store is treated as an empty table.
    pub async fn open(store: Arc<dyn RoutingStore>) -> Self {
        let state = match store.load().await {
            Ok(state) => {
                info!(scopes = state.scopes.len(), "Loaded routing table");
                state
            }
            Err(e) => {
                warn!(error = %e, "Routing store unreadable, starting with an empty table");
                RoutingState::default()
            }
        };
        Self {
            state: RwLock::new(state),
            store,
        }
    }

    pub async fn resolve(&self, scope: &str, category: Option<&str>) -> Option<String> {
        self.state
            .read()
            .await
            .resolve(scope, category)
            .map(str::to_string)
    }

    /// Upsert a route.
    ///
    /// The in-memory table is updated even when persisting fails; the error
    /// is returned so the caller can report it.
    pub async fn configure(
        &self,
        scope: &str,
        destination_id: &str,
        category: Option<&str>,
    ) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.configure(scope, destination_id, category);
        debug!(scope, destination = destination_id, category = ?category, "Configured route");
        self.persist(&state).await
    }

    /// Remove a route. Returns whether anything was removed.
    pub async fn remove(&self, scope: &str, category: Option<&str>) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        if !state.remove(scope, category) {
            return Ok(false);
        }
        debug!(scope, category = ?category, "Removed route");
        self.persist(&state).await?;
        Ok(true)
    }

    /// Seed routes that are not configured yet. Existing entries win.
    pub async fn bootstrap(&self, routes: &[BootstrapRoute]) -> StoreResult<usize> {
        let mut state = self.state.write().await;
        let mut added = 0;
        for route in routes {
            if let Some(channel_id) = &route.channel_id
                && state.resolve(&route.scope, None).is_none()
            {
                state.configure(&route.scope, channel_id, None);
                added += 1;
            }
            for (category, destination) in &route.categories {
                if state.resolve(&route.scope, Some(category)).is_none() {
                    state.configure(&route.scope, destination, Some(category));
                    added += 1;
                }
            }
        }
        if added > 0 {
            info!(added, "Seeded routes from configuration");
            self.persist(&state).await?;
        }
        Ok(added)
    }

    pub async fn snapshot(&self) -> RoutingState {
        self.state.read().await.clone()
    }

    pub async fn scopes(&self) -> Vec<String> {
        self.state.read().await.scopes.keys().cloned().collect()
    }

    async fn persist(&self, state: &RoutingState) -> StoreResult<()> {
        self.store.save(state).await.inspect_err(|e| {
            warn!(error = %e, "Failed to persist routing table");
        })
    }
}

#[async_trait]
impl RoutingLookup for RoutingTable {
    async fn resolve(&self, scope: &str, category: Option<&str>) -> Option<String> {
        RoutingTable::resolve(self, scope, category).await
    }

    async fn scopes(&self) -> Vec<String> {
        RoutingTable::scopes(self).await
    }
}

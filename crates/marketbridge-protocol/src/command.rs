//! Command-based routing configuration.
//!
//! Gateways translate platform commands (e.g. Discord slash commands) into a
//! [`RoutingCommand`] and hand it to a [`CommandHandler`] owned by the core.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A routing configuration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum RoutingCommand {
    /// Route a category (or the general fallback) to a destination.
    Set {
        destination_id: String,
        #[serde(default)]
        category: Option<String>,
    },
    /// Remove a category route (or the general fallback).
    Remove {
        #[serde(default)]
        category: Option<String>,
    },
    /// Describe the current routes for the scope.
    Show,
}

/// Where a command was issued from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandScope {
    /// Tenant identifier (the Discord guild id).
    pub scope: String,
    /// Platform id of the user who issued the command.
    pub user_id: String,
}

/// Text answer for the user who issued a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandReply {
    pub ok: bool,
    pub text: String,
}

impl CommandReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            ok: true,
            text: text.into(),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            ok: false,
            text: text.into(),
        }
    }
}

/// Applies routing commands on behalf of a gateway.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, origin: &CommandScope, command: RoutingCommand) -> CommandReply;
}

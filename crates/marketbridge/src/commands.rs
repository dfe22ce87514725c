//! Routing commands issued from the chat platform.

use std::sync::Arc;

use async_trait::async_trait;
use marketbridge_protocol::{CommandHandler, CommandReply, CommandScope, RoutingCommand};
use tracing::info;

use crate::catalog::CategoryCatalog;
use crate::routing::RoutingTable;

/// Applies [`RoutingCommand`]s to the shared routing table.
pub struct RoutingCommandHandler {
    table: Arc<RoutingTable>,
    catalog: Arc<CategoryCatalog>,
}

impl RoutingCommandHandler {
    pub fn new(table: Arc<RoutingTable>, catalog: Arc<CategoryCatalog>) -> Self {
        Self { table, catalog }
    }

    fn label(&self, category: Option<&str>) -> String {
        match category {
            Some(code) => format!("{} (`{}`)", self.catalog.display_name(code), code),
            None => "general events".to_string(),
        }
    }

    fn unknown_category(&self, code: &str) -> CommandReply {
        let known: Vec<_> = self.catalog.codes().map(|c| format!("`{c}`")).collect();
        CommandReply::error(format!(
            "Unknown category `{code}`. Valid categories: {}",
            known.join(", ")
        ))
    }

    async fn show(&self, scope: &str) -> CommandReply {
        let snapshot = self.table.snapshot().await;
        let Some(routes) = snapshot.scopes.get(scope) else {
            return CommandReply::ok("No routes configured for this server.");
        };

        let mut lines = vec!["Configured routes:".to_string()];
        if let Some(channel) = &routes.channel_id {
            lines.push(format!("- general events: <#{channel}>"));
        }
        for (code, channel) in &routes.categories {
            lines.push(format!("- {}: <#{channel}>", self.label(Some(code))));
        }
        CommandReply::ok(lines.join("\n"))
    }
}

#[async_trait]
impl CommandHandler for RoutingCommandHandler {
    async fn handle(&self, origin: &CommandScope, command: RoutingCommand) -> CommandReply {
        let scope = origin.scope.as_str();
        match command {
            RoutingCommand::Set {
                destination_id,
                category,
            } => {
                let category = category.as_deref().map(str::trim).filter(|c| !c.is_empty());
                if let Some(code) = category
                    && !self.catalog.contains(code)
                {
                    return self.unknown_category(code);
                }
                let label = self.label(category);
                match self.table.configure(scope, &destination_id, category).await {
                    Ok(()) => {
                        info!(
                            scope,
                            user = %origin.user_id,
                            destination = %destination_id,
                            "Route set by command"
                        );
                        CommandReply::ok(format!("{label} will be posted to <#{destination_id}>."))
                    }
                    Err(e) => CommandReply::error(format!(
                        "Route for {label} applied but could not be saved: {e}"
                    )),
                }
            }
            RoutingCommand::Remove { category } => {
                let category = category.as_deref().map(str::trim).filter(|c| !c.is_empty());
                let label = self.label(category);
                match self.table.remove(scope, category).await {
                    Ok(true) => {
                        info!(scope, user = %origin.user_id, "Route removed by command");
                        CommandReply::ok(format!("Removed the route for {label}."))
                    }
                    Ok(false) => CommandReply::ok(format!("No route was configured for {label}.")),
                    Err(e) => CommandReply::error(format!(
                        "Route for {label} removed but the change could not be saved: {e}"
                    )),
                }
            }
            RoutingCommand::Show => self.show(scope).await,
        }
    }
}

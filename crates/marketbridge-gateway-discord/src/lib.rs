//! Discord gateway for marketbridge.
//!
//! [`DiscordGateway`] delivers formatted messages over the Discord REST API.
//! [`run_command_listener`] connects to the Discord gateway and turns `/route`
//! slash commands into [`RoutingCommand`](marketbridge_protocol::RoutingCommand)s.

mod admin;
mod commands;
mod gateway;

pub use admin::{AdminGrant, AdminPolicy, MemberAuthority};
pub use commands::run_command_listener;
pub use gateway::DiscordGateway;

/// Settings for the slash-command listener.
#[derive(Debug, Clone)]
pub struct DiscordConfig {
    pub token: String,
    pub policy: AdminPolicy,
    /// Register `/route` globally once connected.
    pub register_commands: bool,
    /// Category `(code, display name)` pairs offered as command choices.
    pub categories: Vec<(String, String)>,
}

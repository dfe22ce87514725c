//! `/route` slash command.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use marketbridge_protocol::{CommandHandler, CommandScope, RoutingCommand};
use serenity::all::{
    ChannelType, Client, Command, CommandInteraction, CommandOptionType, Context,
    CreateCommand, CreateCommandOption, CreateInteractionResponse,
    CreateInteractionResponseMessage, EventHandler, GatewayIntents, Interaction, Ready,
    ResolvedOption, ResolvedValue,
};
use tracing::{debug, error, info, warn};

use crate::DiscordConfig;
use crate::admin::{AdminPolicy, MemberAuthority};

const COMMAND_NAME: &str = "route";
// Discord caps a string option at 25 choices.
const MAX_CHOICES: usize = 25;

/// Connect to the Discord gateway and serve `/route` until the connection ends.
pub async fn run_command_listener(
    config: DiscordConfig,
    handler: Arc<dyn CommandHandler>,
) -> Result<()> {
    let listener = Listener {
        handler,
        policy: config.policy,
        register_commands: config.register_commands,
        categories: config.categories,
    };
    let mut client = Client::builder(&config.token, GatewayIntents::GUILDS)
        .event_handler(listener)
        .await
        .context("failed to build Discord client")?;
    client
        .start()
        .await
        .context("Discord gateway connection failed")
}

struct Listener {
    handler: Arc<dyn CommandHandler>,
    policy: AdminPolicy,
    register_commands: bool,
    categories: Vec<(String, String)>,
}

#[async_trait]
impl EventHandler for Listener {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, guilds = ready.guilds.len(), "Discord gateway connected");
        if !self.register_commands {
            return;
        }
        match Command::create_global_command(&ctx.http, route_command(&self.categories)).await {
            Ok(_) => info!("Registered /{COMMAND_NAME} command"),
            Err(e) => error!(error = %e, "Failed to register /{COMMAND_NAME} command"),
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };
        if command.data.name != COMMAND_NAME {
            return;
        }
        let text = self.answer(&ctx, &command).await;
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new()
                .content(text)
                .ephemeral(true),
        );
        if let Err(e) = command.create_response(&ctx.http, response).await {
            warn!(error = %e, "Failed to reply to /{COMMAND_NAME}");
        }
    }
}

impl Listener {
    async fn answer(&self, ctx: &Context, command: &CommandInteraction) -> String {
        let Some(guild_id) = command.guild_id else {
            return "This command can only be used in a server.".to_string();
        };
        let Some(routing) = parse_options(&command.data.options()) else {
            return "Unrecognized /route usage.".to_string();
        };

        if !matches!(routing, RoutingCommand::Show) {
            let authority = self.authority(ctx, command).await;
            match self.policy.check(&authority) {
                Some(grant) => debug!(user = %command.user.id, ?grant, "Routing change allowed"),
                None => {
                    info!(user = %command.user.id, guild = %guild_id, "Routing change denied");
                    return "You need an admin role to change routing.".to_string();
                }
            }
        }

        let origin = CommandScope {
            scope: guild_id.to_string(),
            user_id: command.user.id.to_string(),
        };
        let reply = self.handler.handle(&origin, routing).await;
        if reply.ok {
            reply.text
        } else {
            format!("Error: {}", reply.text)
        }
    }

    async fn authority(&self, ctx: &Context, command: &CommandInteraction) -> MemberAuthority {
        let Some(member) = command.member.as_deref() else {
            return MemberAuthority::default();
        };
        let role_ids: Vec<u64> = member.roles.iter().map(|r| r.get()).collect();
        let administrator = member
            .permissions
            .is_some_and(|p| p.administrator());

        let mut role_names = Vec::new();
        if self.policy.needs_role_names(&role_ids) {
            match member.guild_id.roles(&ctx.http).await {
                Ok(roles) => {
                    role_names = member
                        .roles
                        .iter()
                        .filter_map(|id| roles.get(id).map(|r| r.name.clone()))
                        .collect();
                }
                Err(e) => warn!(error = %e, "Could not fetch guild roles"),
            }
        }

        MemberAuthority {
            role_ids,
            role_names,
            administrator,
        }
    }
}

fn route_command(categories: &[(String, String)]) -> CreateCommand {
    let category = || {
        categories.iter().take(MAX_CHOICES).fold(
            CreateCommandOption::new(
                CommandOptionType::String,
                "category",
                "Listing category; leave empty for general events",
            )
            .required(false),
            |option, (code, name)| option.add_string_choice(name, code),
        )
    };

    CreateCommand::new(COMMAND_NAME)
        .description("Configure where marketplace events are posted")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "set",
                "Post events to a channel",
            )
            .add_sub_option(
                CreateCommandOption::new(
                    CommandOptionType::Channel,
                    "channel",
                    "Destination channel",
                )
                .required(true)
                .channel_types(vec![ChannelType::Text, ChannelType::News]),
            )
            .add_sub_option(category()),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::SubCommand,
                "remove",
                "Stop posting events for a category",
            )
            .add_sub_option(category()),
        )
        .add_option(CreateCommandOption::new(
            CommandOptionType::SubCommand,
            "show",
            "Show the configured routes",
        ))
}

fn parse_options(options: &[ResolvedOption<'_>]) -> Option<RoutingCommand> {
    let ResolvedOption {
        name,
        value: ResolvedValue::SubCommand(args),
        ..
    } = options.first()?
    else {
        return None;
    };

    let mut channel = None;
    let mut category = None;
    for arg in args {
        match (arg.name, &arg.value) {
            ("channel", ResolvedValue::Channel(c)) => channel = Some(c.id.to_string()),
            ("category", ResolvedValue::String(s)) => category = Some((*s).to_string()),
            _ => {}
        }
    }
    build_command(name, channel, category)
}

fn build_command(
    subcommand: &str,
    channel: Option<String>,
    category: Option<String>,
) -> Option<RoutingCommand> {
    match subcommand {
        "set" => Some(RoutingCommand::Set {
            destination_id: channel?,
            category,
        }),
        "remove" => Some(RoutingCommand::Remove { category }),
        "show" => Some(RoutingCommand::Show),
        _ => None,
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use marketbridge_protocol::DeliveryGateway;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use marketbridge::auth::WebhookAuth;
use marketbridge::catalog::CategoryCatalog;
use marketbridge::commands::RoutingCommandHandler;
use marketbridge::config::{Config, DEFAULT_CONFIG_PATH, DiscordSettings};
use marketbridge::dispatcher::Dispatcher;
use marketbridge::format::MessageFormatter;
use marketbridge::resolver::DestinationResolver;
use marketbridge::routing::{FileRoutingStore, RoutingStore, RoutingTable};
use marketbridge::server::{self, AppState};

#[derive(Parser)]
#[command(name = "marketbridge", version, about = "Relay marketplace events into Discord")]
struct Cli {
    /// Path to the YAML config file.
    #[arg(short, long, env = "MARKETBRIDGE_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Override `server.host`.
    #[arg(long)]
    host: Option<String>,

    /// Override `server.port`.
    #[arg(short, long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Print the persisted routing table as JSON and exit.
    Routes,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(&cli.config)
        .await
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    match cli.command {
        Some(Command::Routes) => print_routes(&config).await,
        None => serve(config).await,
    }
}

async fn print_routes(config: &Config) -> Result<()> {
    let state = FileRoutingStore::new(&config.routing.path)
        .load()
        .await
        .context("failed to read routing table")?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let catalog = Arc::new(CategoryCatalog::builtin().with_overrides(&config.categories));

    let store = Arc::new(FileRoutingStore::new(&config.routing.path));
    let table = Arc::new(RoutingTable::open(store).await);
    if let Err(e) = table.bootstrap(&config.routing.bootstrap).await {
        warn!(error = %e, "Seeded routes could not be saved");
    }

    let handler = Arc::new(RoutingCommandHandler::new(table.clone(), catalog.clone()));
    let gateway = start_gateway(&config.discord, &catalog, handler)?;

    let dispatcher = Dispatcher::new(
        DestinationResolver::new(table.clone()),
        MessageFormatter::new(&config.frontend_base_url, catalog.clone()),
        gateway,
    )
    .with_thread_visibility(config.discord.thread_visibility);

    let webhook_auth = WebhookAuth::new(&config.webhook.header, config.webhook.secret());
    if !webhook_auth.is_enabled() {
        warn!(
            env = %config.webhook.secret_env,
            "No webhook secret set, accepting unauthenticated webhooks"
        );
    }
    if config.server.admin_token.is_none() {
        info!("No admin token configured, admin API disabled");
    }

    let state = AppState {
        dispatcher,
        routes: table,
        catalog,
        webhook_auth,
        admin_token: config.server.admin_token.clone(),
    };
    let app = server::build_app(state, config.server.request_timeout_seconds);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Marketbridge listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down");
    Ok(())
}

#[cfg(feature = "gateway-discord")]
fn start_gateway(
    settings: &DiscordSettings,
    catalog: &CategoryCatalog,
    handler: Arc<RoutingCommandHandler>,
) -> Result<Arc<dyn DeliveryGateway>> {
    use marketbridge_gateway_discord::{AdminPolicy, DiscordConfig, DiscordGateway};

    let token = std::env::var(&settings.token_env)
        .ok()
        .filter(|t| !t.is_empty())
        .with_context(|| format!("Discord token not set (expected in ${})", settings.token_env))?;

    let config = DiscordConfig {
        token,
        policy: AdminPolicy {
            role_ids: settings.admin_role_ids.clone(),
            role_names: settings.admin_role_names.clone(),
            allow_administrator: settings.allow_administrator_permission,
        },
        register_commands: settings.register_commands,
        categories: catalog
            .codes()
            .map(|code| (code.to_string(), catalog.display_name(code).to_string()))
            .collect(),
    };
    let gateway = Arc::new(DiscordGateway::new(&config.token));

    tokio::spawn(async move {
        if let Err(e) = marketbridge_gateway_discord::run_command_listener(config, handler).await {
            tracing::error!(error = %e, "Discord command listener stopped");
        }
    });

    Ok(gateway)
}

#[cfg(not(feature = "gateway-discord"))]
fn start_gateway(
    _settings: &DiscordSettings,
    _catalog: &CategoryCatalog,
    _handler: Arc<RoutingCommandHandler>,
) -> Result<Arc<dyn DeliveryGateway>> {
    anyhow::bail!("built without a delivery gateway; enable the `gateway-discord` feature")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

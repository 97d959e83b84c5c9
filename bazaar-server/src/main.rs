//! Bazaar broadcast server
//!
//! Real-time channel authorization and event fan-out for the marketplace.

use bazaar_core::conversations::{NoConversations, PgConversationOwnership};
use bazaar_core::gate::ConversationOwnership;
use bazaar_sdk::objects::{Principal, Role};
use bazaar_server::config::{ConfigLoader, get_database_url};
use bazaar_server::server::{build_router, run_server};
use bazaar_server::shutdown::{shutdown_signal, spawn_config_reload_handler};
use bazaar_server::state::AppState;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Bazaar - real-time broadcast server for marketplace AI events
#[derive(Parser, Debug)]
#[command(name = "bazaar-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "BAZAAR_CONFIG", default_value = "./bazaar-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long, env = "BAZAAR_LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a bearer token signed with the configured token secret
    IssueToken {
        /// Principal id
        #[arg(long)]
        user: u64,

        /// Role to grant (repeatable): customer, seller, admin, moderator, data_analyst
        #[arg(long = "role", value_parser = parse_role)]
        roles: Vec<Role>,

        /// Lifetime in seconds
        #[arg(long, default_value = "3600")]
        ttl: u64,
    },
}

fn parse_role(raw: &str) -> Result<Role, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_owned()))
        .map_err(|_| format!("unknown role `{raw}`"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(Command::IssueToken { user, roles, ttl }) = args.command {
        let principal = Principal::new(user, roles);
        let token = bazaar_sdk::token::issue_token(
            &principal,
            Duration::from_secs(ttl),
            loaded_config.tokens.secret.as_bytes(),
        );
        println!("{token}");
        return Ok(());
    }

    tracing::info!("Starting bazaar-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Configuration loaded from {:?}", args.config);

    let listen_addr = loaded_config.server.listen;
    let shared_config = loaded_config.into_shared();

    // Chat channels need the conversation table; everything else works without a database.
    let db_pool = match get_database_url() {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(&database_url)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to connect to database: {}", e);
                    e
                })?;
            tracing::info!("Database connection established");
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, ai.chat.* channels will be refused");
            None
        }
    };
    let conversations: Arc<dyn ConversationOwnership> = match &db_pool {
        Some(pool) => Arc::new(PgConversationOwnership::new(pool.clone())),
        None => Arc::new(NoConversations),
    };

    let (state, background) = AppState::assemble(shared_config, conversations);

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let listener = TcpListener::bind(listen_addr).await?;
    let result = run_server(router, listener, background.shutdown_after(shutdown_signal())).await;

    reload_notify.notify_one();

    tracing::info!("Draining broadcast queue...");
    background.stop().await;

    if let Some(pool) = db_pool {
        tracing::info!("Closing database connections...");
        pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

//! Liaison - identity-linking gateway for chat workspaces

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use liaison::{
    chat::{ChatTransport, SlackClient},
    config::Args,
    db::Database,
    server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("liaison={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Validate configuration
    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    // Print startup banner
    info!("======================================");
    info!("  Liaison - Identity Linking Gateway");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Data dir: {}", args.data_dir);
    info!("Public URL: {}", args.public_url);
    info!("Slack API: {}", args.slack_api_url);
    info!("======================================");

    // Open the embedded database (fatal on error)
    let db = match Database::open(&args.data_dir) {
        Ok(db) => {
            info!("Database opened at {}", args.data_dir);
            db
        }
        Err(e) => {
            error!("Database open failed: {}", e);
            std::process::exit(1);
        }
    };

    // Build the chat transport. In dev mode the bot token may be absent;
    // deliveries will fail with a clear error rather than at startup.
    let bot_token = args.slack_bot_token.clone().unwrap_or_default();
    if bot_token.is_empty() {
        warn!("No Slack bot token configured, message delivery will fail");
    }
    let transport: Arc<dyn ChatTransport> = Arc::new(SlackClient::new(
        &args.slack_api_url,
        &bot_token,
        args.request_timeout_ms,
    ));

    // Create application state
    let state = server::AppState::new(args, db, transport)?;

    // Run the server
    if let Err(e) = server::run(Arc::new(state)).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}

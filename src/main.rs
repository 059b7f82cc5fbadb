//! Gatehouse - device enrollment and key escrow gateway

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse::{config::Args, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gatehouse={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    let policy = args.protocol_config();
    info!("======================================");
    info!("  Gatehouse - device enrollment gateway");
    info!("======================================");
    info!("Version: {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_COMMIT_SHORT"));
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Storage: {}", args.storage_backend());
    if !args.dev_mode {
        info!("MongoDB database: {}", args.mongodb_db);
    }
    info!("Operation timeout: {:?}", policy.operation_timeout);
    info!("Max body: {} bytes", args.max_body_bytes);
    info!(
        "Heartbeat interval: {}s, retry {}s..{}s x{} (max {} retries)",
        policy.checkin.heartbeat_interval,
        policy.checkin.retry_policy.initial_delay,
        policy.checkin.retry_policy.max_delay,
        policy.checkin.retry_policy.backoff_factor,
        policy.checkin.retry_policy.max_retries
    );
    info!("======================================");

    let state = match server::AppState::connect(args).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialise storage: {}", e);
            std::process::exit(1);
        }
    };

    server::run(state).await?;

    Ok(())
}

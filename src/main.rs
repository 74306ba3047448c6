//! Studyhall - student collaboration backend

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use studyhall::{
    config::Args,
    db::{seed, MemStorage, SeedOptions, SAMPLE_PASSWORD},
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("studyhall={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Studyhall");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Max body: {} bytes", args.max_body_bytes);
    info!("======================================");

    if args.dev_mode {
        warn!("Development mode: default JWT secret and admin password are in use unless overridden");
    }

    let admin_password = match args.admin_password() {
        Some(password) => password,
        None => {
            error!("ADMIN_PASSWORD is required");
            std::process::exit(1);
        }
    };

    let store = Arc::new(MemStorage::new());
    let report = seed(
        &store,
        &SeedOptions {
            admin_username: args.admin_username.clone(),
            admin_email: args.admin_email.clone(),
            admin_password,
            sample_users: args.seed_sample_users,
        },
    )
    .await?;

    info!(
        "Seeded admin '{}' (id {}) and {} sample user(s)",
        report.admin.username, report.admin.id, report.sample_users
    );
    if report.sample_users > 0 {
        info!("Sample accounts use the password '{}'", SAMPLE_PASSWORD);
    }

    let state = Arc::new(AppState::new(args, store)?);
    server::run(state).await?;

    Ok(())
}

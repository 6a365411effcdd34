//! Turnstile - event check-in and entitlement distribution API

use bson::doc;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use turnstile::auth::{hash_password, Role};
use turnstile::config::Args;
use turnstile::db::schemas::StaffDoc;
use turnstile::db::MongoClient;
use turnstile::server::{self, AppState};
use turnstile::services::MailRelayNotifier;

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
                .unwrap_or_else(|_| format!("turnstile={},info", log_level).into()),
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
    info!("  Turnstile - Check-in & Entitlements");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!(
        "Mail relay: {}",
        args.mailer_url.as_deref().unwrap_or("(none, delivery disabled)")
    );
    info!("Import row cap: {}", args.import_row_cap);
    info!("======================================");

    // Connect to MongoDB; nothing works without the store
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            client
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    // Create the bootstrap admin account if configured and absent
    if let (Some(username), Some(password)) =
        (args.bootstrap_admin_user.clone(), args.bootstrap_admin_password.clone())
    {
        bootstrap_admin(&mongo, &username, &password).await?;
    }

    let notifier = Arc::new(MailRelayNotifier::new(args.mailer_url.clone()));
    let state = Arc::new(AppState::new(args, mongo, notifier)?);

    server::run(state).await?;

    Ok(())
}

/// Ensure the configured bootstrap admin exists
async fn bootstrap_admin(mongo: &MongoClient, username: &str, password: &str) -> anyhow::Result<()> {
    use turnstile::db::schemas::STAFF_COLLECTION;

    let staff = mongo.collection::<StaffDoc>(STAFF_COLLECTION).await?;
    let username = username.trim().to_lowercase();

    if staff.find_one(doc! { "username": &username }).await?.is_some() {
        info!("Bootstrap admin {} already exists", username);
        return Ok(());
    }

    let password_hash = hash_password(password)?;
    staff
        .insert_one(StaffDoc::new(&username, password_hash, Role::Admin))
        .await?;
    info!("Bootstrap admin {} created", username);

    Ok(())
}

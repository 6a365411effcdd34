//! Configuration for Turnstile
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Turnstile - event check-in and entitlement distribution API
#[derive(Parser, Debug, Clone)]
#[command(name = "turnstile")]
#[command(about = "Event check-in and entitlement distribution API")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Enable development mode (permits a built-in JWT secret and a missing
    /// mail relay)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "turnstile")]
    pub mongodb_db: String,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Mail relay base URL for badge delivery (optional; delivery is
    /// skipped when unset)
    #[arg(long, env = "MAILER_URL")]
    pub mailer_url: Option<String>,

    /// Username of the bootstrap admin account created at first start
    #[arg(long, env = "BOOTSTRAP_ADMIN_USER")]
    pub bootstrap_admin_user: Option<String>,

    /// Password of the bootstrap admin account
    #[arg(long, env = "BOOTSTRAP_ADMIN_PASSWORD")]
    pub bootstrap_admin_password: Option<String>,

    /// Maximum rows accepted per import batch
    #[arg(long, env = "IMPORT_ROW_CAP", default_value = "1000")]
    pub import_row_cap: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required in production mode".to_string());
        }

        if self.import_row_cap == 0 {
            return Err("IMPORT_ROW_CAP must be positive".to_string());
        }

        if self.bootstrap_admin_user.is_some() != self.bootstrap_admin_password.is_some() {
            return Err(
                "BOOTSTRAP_ADMIN_USER and BOOTSTRAP_ADMIN_PASSWORD must be set together"
                    .to_string(),
            );
        }

        Ok(())
    }
}

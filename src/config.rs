//! Configuration for Studyhall
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Studyhall - student collaboration backend
#[derive(Parser, Debug, Clone)]
#[command(name = "studyhall")]
#[command(about = "Papers, discussions, study groups and friends for students")]
pub struct Args {
    /// Unique identifier for this server instance (shows up in logs and /health)
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// Enable development mode (insecure JWT and admin password defaults)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// JWT secret for token signing (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "86400")]
    pub jwt_expiry_seconds: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Username of the seeded first admin account
    #[arg(long, env = "ADMIN_USERNAME", default_value = "admin")]
    pub admin_username: String,

    /// Email of the seeded first admin account
    #[arg(long, env = "ADMIN_EMAIL", default_value = "admin@studyhall.local")]
    pub admin_email: String,

    /// Password of the seeded first admin account (required in production)
    #[arg(long, env = "ADMIN_PASSWORD")]
    pub admin_password: Option<String>,

    /// Number of generated sample student accounts seeded at startup
    #[arg(long, env = "SEED_SAMPLE_USERS", default_value = "5")]
    pub seed_sample_users: usize,

    /// Maximum accepted request body size in bytes
    #[arg(long, env = "MAX_BODY_BYTES", default_value = "1048576")]
    pub max_body_bytes: usize,

    /// Number of trailing group chat messages returned when no limit is given
    #[arg(long, env = "CHAT_HISTORY_LIMIT", default_value = "50")]
    pub chat_history_limit: usize,
}

impl Args {
    /// Get effective JWT secret (uses default in dev mode)
    pub fn jwt_secret(&self) -> Option<String> {
        match &self.jwt_secret {
            Some(secret) => Some(secret.clone()),
            None if self.dev_mode => Some("dev-only-insecure-secret-do-not-deploy".to_string()),
            None => None,
        }
    }

    /// Get effective first-admin password (uses default in dev mode)
    pub fn admin_password(&self) -> Option<String> {
        match &self.admin_password {
            Some(password) => Some(password.clone()),
            None if self.dev_mode => Some("admin123".to_string()),
            None => None,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            if self.jwt_secret.is_none() {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            if self.admin_password.is_none() {
                return Err("ADMIN_PASSWORD is required in production mode".to_string());
            }
        }

        if self.admin_username.trim().is_empty() {
            return Err("ADMIN_USERNAME must not be empty".to_string());
        }

        if self.max_body_bytes == 0 {
            return Err("MAX_BODY_BYTES must be greater than zero".to_string());
        }

        if self.chat_history_limit == 0 {
            return Err("CHAT_HISTORY_LIMIT must be greater than zero".to_string());
        }

        Ok(())
    }
}

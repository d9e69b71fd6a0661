//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::authority::AuthoritySettings;
use crate::clock::SystemClock;
use crate::db::Database;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use url::Url;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "session-authority",
    about = "Issues, verifies, extends and revokes session tokens"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SESSION_PORT", default_value = "17080")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, env = "SESSION_DATABASE", default_value = "sessions.db")]
    pub database: String,

    /// Geolocation service base URL; the login IP is appended as the last path segment
    #[arg(long, env = "SESSION_GEO_ENDPOINT", value_parser = validate_geo_endpoint)]
    pub geo_endpoint: Option<Url>,

    /// Upper bound on a geolocation lookup, in milliseconds
    #[arg(long, default_value = "1500")]
    pub geo_timeout_ms: u64,

    /// Upper bound on each database or cache call, in milliseconds
    #[arg(long, default_value = "2000")]
    pub io_timeout_ms: u64,

    /// Seconds between expiry cleanup runs
    #[arg(long, default_value = "300", value_parser = clap::value_parser!(u64).range(1..))]
    pub cleanup_interval_secs: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

fn validate_geo_endpoint(s: &str) -> Result<Url, String> {
    let url = Url::parse(s).map_err(|e| format!("Invalid geolocation URL {}: {}", s, e))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(format!("Geolocation URL must be http(s): {}", s));
    }
    Ok(url)
}

impl Args {
    pub fn settings(&self) -> AuthoritySettings {
        AuthoritySettings {
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            geo_timeout: Duration::from_millis(self.geo_timeout_ms),
        }
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Build ServerConfig from validated arguments.
pub fn build_config(args: &Args, db: Database) -> ServerConfig {
    ServerConfig {
        db,
        clock: Arc::new(SystemClock),
        geo_endpoint: args.geo_endpoint.clone(),
        settings: args.settings(),
    }
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}

//! Configuration loading for the listing-desk daemon.
//!
//! Loads configuration from TOML files and/or environment variables using figment.
//! Secrets (admin password, storage key, email API key) are usually supplied
//! through the environment, everything else through the config file.
//!
//! # Configuration Sources (in order of priority, lowest to highest)
//!
//! 1. Default values (from `#[serde(default)]` attributes)
//! 2. TOML config file (if provided)
//! 3. Environment variables (prefix: `LISTING_`, nested with `__`)
//!
//! # Environment Variable Naming
//!
//! - `LISTING_SERVER__LISTEN_ADDR` → `server.listen_addr`
//! - `LISTING_ADMIN__USERNAME` → `admin.username`
//! - `LISTING_ADMIN__PASSWORD` → `admin.password`
//! - `LISTING_STORAGE__URL` → `storage.url`
//! - `LISTING_STORAGE__SERVICE_ROLE_KEY` → `storage.service_role_key`
//! - `LISTING_STORAGE__BUCKET` → `storage.bucket`
//! - `LISTING_CONTACT__SENDGRID_API_KEY` → `contact.sendgrid_api_key`
//! - `LISTING_CONTACT__FROM` / `LISTING_CONTACT__TO`
//!
//! Missing admin or contact secrets do not stop the daemon from starting;
//! the affected endpoints answer with a configuration error instead.

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix.
const ENV_PREFIX: &str = "LISTING_";

/// Main configuration for the daemon.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Admin credentials for the session gate
    #[serde(default)]
    pub admin: AdminConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Object storage for property images
    #[serde(default)]
    pub storage: StorageConfig,

    /// Contact form email delivery
    #[serde(default)]
    pub contact: ContactConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Add `Secure` to the session cookie (enable behind HTTPS).
    #[serde(default)]
    pub secure_cookies: bool,

    /// Reject property and upload writes that carry no valid admin cookie.
    #[serde(default)]
    pub require_session_for_writes: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            secure_cookies: false,
            require_session_for_writes: false,
        }
    }
}

fn default_listen_addr() -> String {
    "0.0.0.0:3000".to_string()
}

/// Admin credentials.
///
/// Compared verbatim against the login form. Both must be set for login to work.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AdminConfig {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

/// Object storage configuration (Supabase Storage).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    #[serde(default)]
    pub url: String,

    /// Service role key used for uploads and deletes
    #[serde(default)]
    pub service_role_key: String,

    /// Bucket holding property images
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            service_role_key: String::new(),
            bucket: default_bucket(),
        }
    }
}

fn default_bucket() -> String {
    "mgsi_bucket".to_string()
}

/// Contact form delivery configuration (SendGrid).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContactConfig {
    #[serde(default)]
    pub sendgrid_api_key: Option<String>,

    /// Sender address
    #[serde(default)]
    pub from: Option<String>,

    /// Recipient address for contact requests
    #[serde(default)]
    pub to: Option<String>,
}

// =============================================================================
// Database Configuration (compile-time feature selection)
// =============================================================================

/// SQLite database configuration (used when compiled with `sqlite` feature).
#[cfg(feature = "sqlite")]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    /// If not specified, defaults to `listings.db` in the data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Pool size (default: 5)
    #[serde(default = "default_sqlite_max_connections")]
    pub max_connections: u32,
}

#[cfg(feature = "sqlite")]
fn default_sqlite_max_connections() -> u32 {
    5
}

#[cfg(feature = "sqlite")]
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: default_sqlite_max_connections(),
        }
    }
}

/// PostgreSQL database configuration (used when compiled with `postgres` feature).
#[cfg(feature = "postgres")]
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database host (default: "localhost")
    #[serde(default = "default_postgres_host")]
    pub host: String,

    /// Database port (default: 5432)
    #[serde(default = "default_postgres_port")]
    pub port: u16,

    /// Database user
    #[serde(default)]
    pub user: String,

    /// Database password
    #[serde(default)]
    pub password: String,

    /// Database name (default: "listings")
    #[serde(default = "default_postgres_database")]
    pub database: String,

    /// Pool size (default: 10)
    #[serde(default = "default_postgres_max_connections")]
    pub max_connections: u32,
}

#[cfg(feature = "postgres")]
fn default_postgres_max_connections() -> u32 {
    10
}

#[cfg(feature = "postgres")]
fn default_postgres_host() -> String {
    "localhost".to_string()
}

#[cfg(feature = "postgres")]
fn default_postgres_port() -> u16 {
    5432
}

#[cfg(feature = "postgres")]
fn default_postgres_database() -> String {
    "listings".to_string()
}

#[cfg(feature = "postgres")]
impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_postgres_host(),
            port: default_postgres_port(),
            user: String::new(),
            password: String::new(),
            database: default_postgres_database(),
            max_connections: default_postgres_max_connections(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file and environment variables.
    ///
    /// Configuration sources are merged in order (later sources override earlier):
    /// 1. TOML config file (if it exists)
    /// 2. Environment variables (prefix: `LISTING_`, nested with `__`)
    ///
    /// # Example
    ///
    /// ```bash
    /// export LISTING_ADMIN__USERNAME=admin
    /// export LISTING_ADMIN__PASSWORD=change-me
    /// ```
    pub fn load(path: &Path) -> Result<Self> {
        let mut figment = Figment::new();

        if path.exists() {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract().with_context(|| {
            format!(
                "Failed to load config from {} and environment",
                path.display()
            )
        })?;

        Ok(config)
    }

    /// Get the default config file path
    /// - macOS: ~/Library/Application Support/listing-desk/config.toml
    /// - Linux: ~/.config/listing-desk/config.toml
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("listing-desk")
            .join("config.toml")
    }

    /// Get the default data directory (for the SQLite database and logs)
    /// - macOS: ~/Library/Application Support/listing-desk/
    /// - Linux: ~/.local/share/listing-desk/
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("listing-desk")
    }
}

/// Create a default configuration template
pub fn default_config_template() -> String {
    let data_dir = Config::default_data_dir();
    let data_dir_str = data_dir.display();

    format!(
        r#"# listing-desk configuration
# Data directory: {data_dir_str}
#
# Secrets can stay out of this file: every key can be set through the
# environment with the LISTING_ prefix, e.g. LISTING_ADMIN__PASSWORD.

[server]
listen_addr = "0.0.0.0:3000"
# Mark the admin cookie Secure (serve behind HTTPS when enabled)
secure_cookies = false
# Require a valid admin cookie for property and upload writes
require_session_for_writes = false

[admin]
# username = "admin"
# password = "change-me"

# =============================================================================
# Database Configuration
# =============================================================================
#
# The backend is selected at compile time via cargo features:
#   - cargo build -p listing-desk --features sqlite (default)
#   - cargo build -p listing-desk --features postgres --no-default-features

# SQLite configuration (when compiled with --features sqlite)
[database]
# path = "{data_dir_str}/listings.db"  # Optional, defaults to data_dir/listings.db
# max_connections = 5

# PostgreSQL configuration (when compiled with --features postgres)
# [database]
# host = "localhost"
# port = 5432
# user = "listings"
# password = "secret"
# database = "listings"
# max_connections = 10

# =============================================================================
# Image Storage (Supabase Storage)
# =============================================================================

[storage]
url = "https://your-project.supabase.co"
# service_role_key = "..."
bucket = "mgsi_bucket"

# =============================================================================
# Contact Form (SendGrid)
# =============================================================================

[contact]
# sendgrid_api_key = "SG...."
# from = "website@example.com"
# to = "sales@example.com"
"#
    )
}

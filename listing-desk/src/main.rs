//! Listing Desk - Main entry point
//!
//! The listing-desk daemon serves the property catalogue API for the public
//! site and its admin panel, stores listing images in object storage and
//! forwards contact requests by email.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use listing_desk::api::AppState;
use listing_desk::config::{self, Config, StorageConfig};
use listing_desk::contact::{ContactNotifier, LogMailer, Mailer};
use listing_desk::db::Database;
use listing_desk::repository::PropertyStore;
use listing_desk::server::{ServerConfig, run_server};
use listing_desk::session::{self, SessionGate};
use listing_desk::storage::{ImageStore, MemoryObjectStore, ObjectStore, SupabaseStorage};

/// Listing Desk - Property listings API
#[derive(Parser)]
#[command(name = "listing-desk")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value_os_t = Config::default_path())]
    config: PathBuf,

    /// Data directory for the database and logs
    #[arg(short, long, default_value_os_t = Config::default_data_dir())]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the API server
    Serve {
        /// Address to listen on (overrides config)
        #[arg(long)]
        listen: Option<SocketAddr>,

        /// Dry-run mode: keep images in memory and log contact emails instead of sending them
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate a default configuration file
    InitConfig {
        /// Output path (defaults to stdout if not specified)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check whether an admin token would be accepted
    CheckToken {
        /// Token value (as stored in the admin-token cookie)
        token: String,
    },

    /// Remove every stored image of a property
    PurgeImages {
        /// Property ID whose image folder should be emptied
        property_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on command type
    let filter = if cli.verbose {
        EnvFilter::from_default_env().add_directive(Level::DEBUG.into())
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    match cli.command {
        Commands::Serve { listen, dry_run } => {
            // For daemon mode: log to both stdout and file with rotation
            init_daemon_logging(&cli.data_dir, filter)?;
            serve(&cli.config, &cli.data_dir, listen, dry_run).await
        }
        Commands::InitConfig { output } => {
            init_cli_logging(filter);
            generate_config(output)
        }
        Commands::CheckToken { token } => {
            init_cli_logging(filter);
            check_token(&token)
        }
        Commands::PurgeImages { property_id } => {
            init_cli_logging(filter);
            purge_images(&cli.config, &property_id).await
        }
    }
}

/// Initialize logging for CLI commands (stdout only).
fn init_cli_logging(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
}

/// Initialize logging for daemon mode (stdout + rotating file).
fn init_daemon_logging(data_dir: &Path, filter: EnvFilter) -> Result<()> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    // Daily rotation, e.g. listing-desk.2026-10-19.log
    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("listing-desk")
        .filename_suffix("log")
        .build(&log_dir)
        .with_context(|| "Failed to create log file appender")?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    // The writer must outlive every log call; the daemon runs until exit
    std::mem::forget(guard);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false)) // stdout
        .with(fmt::layer().with_target(true).with_ansi(false).with_writer(non_blocking)) // file
        .init();

    info!("Logging to: {}", log_dir.display());
    Ok(())
}

/// Run the API server
async fn serve(
    config_path: &Path,
    data_dir: &Path,
    listen_override: Option<SocketAddr>,
    dry_run: bool,
) -> Result<()> {
    ensure_data_dir(data_dir)?;

    let config = Config::load(config_path)?;

    let listen_addr: SocketAddr = match listen_override {
        Some(addr) => addr,
        None => config.server.listen_addr.parse().with_context(|| {
            format!("Invalid listen address in config: {}", config.server.listen_addr)
        })?,
    };

    let database = Database::new(&config.database, data_dir).await?;
    let properties = PropertyStore::new(database.pool());

    // In dry-run mode, keep images in memory and only log contact emails
    let (images, contact) = if dry_run {
        warn!("DRY-RUN MODE: images are kept in memory and contact emails are only logged");
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryObjectStore::new(&config.storage.bucket));
        let mailer: Arc<dyn Mailer> = Arc::new(LogMailer);

        let mut contact_config = config.contact.clone();
        contact_config.from.get_or_insert_with(|| "dry-run@localhost".to_string());
        contact_config.to.get_or_insert_with(|| "dry-run@localhost".to_string());

        (
            ImageStore::new(store),
            ContactNotifier::new(Some(mailer), &contact_config),
        )
    } else {
        let store: Arc<dyn ObjectStore> = Arc::new(supabase_storage(&config.storage).context(
            "Object storage is not configured. Fix the configuration or use --dry-run.",
        )?);

        if config.contact.sendgrid_api_key.is_none() {
            warn!("No SendGrid API key configured; contact form submissions will fail");
        }

        (
            ImageStore::new(store),
            ContactNotifier::from_config(&config.contact),
        )
    };

    if config.admin.username.is_none() || config.admin.password.is_none() {
        warn!("Admin credentials not configured; admin login is disabled");
    }
    if !config.server.require_session_for_writes {
        warn!("Property and upload writes do not require an admin session");
    }

    let state = Arc::new(AppState {
        properties,
        images,
        contact,
        session: SessionGate::new(&config.admin, config.server.secure_cookies),
        require_session_for_writes: config.server.require_session_for_writes,
    });

    info!("Listing Desk starting...");
    info!("Listening on: {}", listen_addr);

    run_server(ServerConfig { listen_addr }, state).await
}

/// Build the Supabase client, refusing a half-filled storage section.
fn supabase_storage(config: &StorageConfig) -> Result<SupabaseStorage> {
    if config.url.is_empty() {
        return Err(anyhow!("storage.url is not set"));
    }
    if config.service_role_key.is_empty() {
        return Err(anyhow!("storage.service_role_key is not set"));
    }
    Ok(SupabaseStorage::new(config))
}

/// Ensure data directory exists
fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    if !data_dir.exists() {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        info!("Created data directory: {}", data_dir.display());
    }
    Ok(())
}

/// Generate a default configuration file
fn generate_config(output: Option<PathBuf>) -> Result<()> {
    let config = config::default_config_template();

    match output {
        Some(path) => {
            std::fs::write(&path, &config)?;
            println!("Configuration written to: {}", path.display());
        }
        None => {
            print!("{}", config);
        }
    }

    Ok(())
}

/// Report whether a token passes the admin session check
fn check_token(token: &str) -> Result<()> {
    if !session::check_session(token) {
        bail!("Token would be rejected: it does not decode to an admin session");
    }

    match session::token_created_at(token) {
        Some(created) => println!("Token accepted (issued {})", created.to_rfc3339()),
        None => println!("Token accepted (no issue time embedded)"),
    }
    Ok(())
}

/// Empty a property's image folder in object storage
async fn purge_images(config_path: &Path, property_id: &str) -> Result<()> {
    let property_id = property_id.trim();
    if property_id.is_empty() {
        bail!("Property ID must not be empty");
    }

    let config = Config::load(config_path)?;
    let storage = supabase_storage(&config.storage).context("Object storage is not configured")?;
    let images = ImageStore::new(Arc::new(storage));

    let removed = images
        .delete_folder(property_id)
        .await
        .with_context(|| format!("Failed to purge images of {property_id}"))?;

    println!("Removed {removed} image(s) for property {property_id}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses() {
        let cli = Cli::try_parse_from(["listing-desk", "serve", "--listen", "127.0.0.1:4000", "--dry-run"])
            .unwrap();
        match cli.command {
            Commands::Serve { listen, dry_run } => {
                assert_eq!(listen, Some("127.0.0.1:4000".parse().unwrap()));
                assert!(dry_run);
            }
            _ => panic!("expected serve"),
        }

        let cli = Cli::try_parse_from(["listing-desk", "-v", "purge-images", "abc"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(cli.command, Commands::PurgeImages { property_id } if property_id == "abc"));
    }

    #[test]
    fn test_check_token() {
        let token = session::issue_token(chrono::Utc::now());
        assert!(check_token(&token).is_ok());
        assert!(check_token("garbage").is_err());
    }

    #[test]
    fn test_supabase_storage_requires_settings() {
        assert!(supabase_storage(&StorageConfig::default()).is_err());
        assert!(
            supabase_storage(&StorageConfig {
                url: "https://x.supabase.co".into(),
                service_role_key: "key".into(),
                ..StorageConfig::default()
            })
            .is_ok()
        );
    }
}

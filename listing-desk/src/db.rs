//! Connection pool and schema migrations for the listings database.
//!
//! One backend is compiled in, chosen by cargo feature: `sqlite` (default)
//! or `postgres`. Both share the migrations under `migrations/shared`.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use crate::config::DatabaseConfig;

#[cfg(feature = "sqlite")]
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
#[cfg(feature = "sqlite")]
use std::time::Duration;

#[cfg(feature = "postgres")]
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};

#[cfg(feature = "sqlite")]
pub use sqlx::{SqlitePool as DbPool, sqlite::SqliteRow as DbRow};

#[cfg(feature = "postgres")]
pub use sqlx::{PgPool as DbPool, postgres::PgRow as DbRow};

/// SQLite file name used when no explicit path is configured.
#[cfg(feature = "sqlite")]
const DEFAULT_DB_FILE: &str = "listings.db";

/// Handle to the listings database. Built once by `serve` and handed to
/// [`PropertyStore`](crate::repository::PropertyStore).
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (creating if needed) the SQLite file and bring the schema up to date.
    #[cfg(feature = "sqlite")]
    pub async fn new(config: &DatabaseConfig, data_dir: &Path) -> Result<Self> {
        let db_path = config
            .path
            .clone()
            .unwrap_or_else(|| data_dir.join(DEFAULT_DB_FILE));

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory: {}", parent.display())
            })?;
        }

        // WAL lets list queries run while a write is in progress
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite database {}", db_path.display()))?;

        migrate(&pool).await?;

        info!(backend = "sqlite", path = %db_path.display(), "Database ready");
        Ok(Self { pool })
    }

    /// Connect to PostgreSQL and bring the schema up to date.
    #[cfg(feature = "postgres")]
    pub async fn new(config: &DatabaseConfig, _data_dir: &Path) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.user)
            .password(&config.password)
            .database(&config.database);

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to PostgreSQL at {}:{}/{}",
                    config.host, config.port, config.database
                )
            })?;

        migrate(&pool).await?;

        info!(
            backend = "postgres",
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Database ready"
        );
        Ok(Self { pool })
    }

    /// Pool handle (clones share the same connections).
    pub fn pool(&self) -> DbPool {
        self.pool.clone()
    }
}

async fn migrate(pool: &DbPool) -> Result<()> {
    sqlx::migrate!("./migrations/shared")
        .run(pool)
        .await
        .context("Failed to apply database migrations")?;
    debug!("Migrations applied");
    Ok(())
}

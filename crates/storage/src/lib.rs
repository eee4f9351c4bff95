//! Storage layer: SQLite schema and helpers.
//!
//! Holds DB pool setup, the migration runner and the row types read back by
//! the catalog.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

pub mod models;

pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    let url = to_sqlite_url(database_url);
    let in_memory = url.contains("memory");

    let mut options = SqliteConnectOptions::from_str(&url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(10));
    if !in_memory {
        // WAL lets readers keep a consistent snapshot while the writer commits.
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let mut opts = SqlitePoolOptions::new();
    if in_memory {
        opts = opts.max_connections(1);
    } else {
        opts = opts.max_connections(5);
    }
    let pool = opts.connect_with(options).await?;
    tracing::debug!(url = %url, "catalog database connected");
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> anyhow::Result<()> {
    // Applies SQLx migrations located in crates/storage/migrations.
    // Safe to run multiple times (idempotent).
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Turns a bare filesystem path into a `sqlite:` URL, creating its parent
/// directory on the way. URLs are passed through untouched.
fn to_sqlite_url(database_url: &str) -> String {
    if database_url.starts_with("sqlite:") {
        return database_url.to_string();
    }
    let path = std::path::PathBuf::from(database_url);
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let norm = path.to_string_lossy().replace('\\', "/");
    if path.is_absolute() {
        format!("sqlite:///{}", norm.trim_start_matches('/'))
    } else {
        format!("sqlite://{}", norm)
    }
}

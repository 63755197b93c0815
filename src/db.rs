//! SQLite connection pool.
//!
//! One database file holds both the metadata store and the vector index, so
//! a single pool serves every component. WAL mode lets queries read while a
//! background ingestion commits, and the busy timeout covers two ingestions
//! committing back to back. Foreign keys are enforced because chunk, table,
//! and index rows all reference their owning document.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

pub async fn connect(config: &Config) -> Result<SqlitePool> {
    let db_path = &config.db.path;

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    // One writer (an ingestion transaction) plus readers for queries and
    // listings.
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}

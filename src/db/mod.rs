mod models;

pub use models::*;

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    SqlitePool,
};
use std::str::FromStr;
use tracing::info;

use crate::config::DatabaseConfig;

pub type DbPool = SqlitePool;

/// Current time in the fixed-width RFC 3339 form used by every timestamp column,
/// so that string comparison matches chronological order.
pub fn now() -> String {
    timestamp(Utc::now())
}

pub fn timestamp(at: chrono::DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in sql.split(';') {
        let cleaned: String = statement
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = cleaned.trim();
        if !trimmed.is_empty() {
            sqlx::query(trimmed).execute(pool).await?;
        }
    }
    Ok(())
}

/// Open the pool and bring the schema up to date. Called once at startup; the
/// returned pool is shared through `AppState` and closed with [`close`].
pub async fn init(config: &DatabaseConfig) -> Result<DbPool> {
    std::fs::create_dir_all(&config.data_dir)?;
    let db_path = config.data_dir.join("lustre.db");
    info!("Initializing database at {}", db_path.display());

    let options = SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Single-connection in-memory database, used by tests and `--ephemeral` runs.
pub async fn init_in_memory() -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

pub async fn close(pool: DbPool) {
    pool.close().await;
    info!("Database connections closed");
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: users, sessions, catalog
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: carts, orders, wishlist
    let has_wishlist_table: Option<(String,)> =
        sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' AND name='wishlist'")
            .fetch_optional(pool)
            .await?;
    if has_wishlist_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/002_commerce.sql")).await?;
    }

    // Migration 003: product search text
    let has_search_text: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM pragma_table_info('products') WHERE name = 'search_text'",
    )
    .fetch_optional(pool)
    .await?;
    if has_search_text.is_none() {
        execute_sql(pool, include_str!("../../migrations/003_search_text.sql")).await?;
        let filled = models::product::backfill_search_text(pool).await?;
        info!("Indexed {} products for search", filled);
    }

    info!("Migrations completed");
    Ok(())
}

//! Database schema migrations
//!
//! Versioned, idempotent schema changes tracked in the `schema_version`
//! table. `CREATE TABLE IF NOT EXISTS` in [`crate::db::init`] always carries
//! the newest layout, so on a fresh database every migration is a no-op that
//! only records its version. Older databases get the missing columns added.
//!
//! Never edit a released migration; add a new one and bump
//! [`CURRENT_SCHEMA_VERSION`].

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version has no rows
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
    }

    info!("All migrations completed");
    Ok(())
}

/// Migration v1: cross-round columns on household_member
///
/// Databases from the single-round pilot lack the clone bookkeeping.
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    add_column_if_missing(
        pool,
        "household_member",
        "cloned",
        "INTEGER NOT NULL DEFAULT 0",
    )
    .await?;
    add_column_if_missing(
        pool,
        "household_member",
        "consented_in_previous_round",
        "INTEGER NOT NULL DEFAULT 0",
    )
    .await?;
    Ok(())
}

/// Migration v2: non_citizen flag on enrollment_checklist
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    add_column_if_missing(
        pool,
        "enrollment_checklist",
        "non_citizen",
        "INTEGER NOT NULL DEFAULT 0",
    )
    .await?;
    Ok(())
}

/// Add a column unless it already exists
///
/// Returns true when the column was added.
pub async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<bool> {
    let has_column: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;

    if has_column > 0 {
        return Ok(false);
    }

    let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {definition}");
    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => {
            info!("Added column {}.{}", table, column);
            Ok(true)
        }
        // Another connection added it between the check and the ALTER
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}

//! Database initialization
//!
//! Opens (creating if needed) the census SQLite database and brings the
//! schema up to date. Table creation is idempotent; structural changes after
//! the first release go through [`crate::db::migrations`].

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the read side of the UI keep working while a save commits
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    prepare_schema(&pool).await?;
    Ok(pool)
}

/// Open a private in-memory database with the full schema
///
/// Limited to a single connection: every SQLite memory connection is its own
/// database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    prepare_schema(&pool).await?;
    Ok(pool)
}

async fn prepare_schema(pool: &SqlitePool) -> Result<()> {
    // Satellite records rely on ON DELETE CASCADE
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(pool)
        .await?;

    create_schema_version_table(pool).await?;
    create_household_member_table(pool).await?;
    create_enrollment_checklist_table(pool).await?;
    create_enrollment_loss_table(pool).await?;
    create_visit_tables(pool, "subject_absentee").await?;
    create_visit_tables(pool, "subject_undecided").await?;
    create_subject_refusal_table(pool).await?;
    create_deceased_member_table(pool).await?;
    create_htc_member_table(pool).await?;

    crate::db::migrations::run_migrations(pool).await?;
    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per person per survey round
///
/// `internal_identifier` is stable across rounds; `id` is per round.
pub async fn create_household_member_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS household_member (
            id TEXT PRIMARY KEY,
            internal_identifier TEXT NOT NULL,
            subject_identifier TEXT,
            survey TEXT NOT NULL,
            household_identifier TEXT NOT NULL,
            first_name TEXT NOT NULL,
            initials TEXT NOT NULL,
            gender TEXT NOT NULL,
            relation TEXT NOT NULL,
            age_in_years INTEGER NOT NULL,
            survival_status TEXT NOT NULL,
            study_resident TEXT NOT NULL,
            inability_to_participate TEXT NOT NULL,
            present_today TEXT NOT NULL,
            eligible_member INTEGER NOT NULL DEFAULT 0,
            eligible_subject INTEGER NOT NULL DEFAULT 0,
            eligible_htc INTEGER NOT NULL DEFAULT 0,
            eligible_hoh INTEGER NOT NULL DEFAULT 0,
            is_consented INTEGER NOT NULL DEFAULT 0,
            enrollment_checklist_completed INTEGER NOT NULL DEFAULT 0,
            enrollment_loss_completed INTEGER NOT NULL DEFAULT 0,
            refused INTEGER NOT NULL DEFAULT 0,
            undecided INTEGER NOT NULL DEFAULT 0,
            absent INTEGER NOT NULL DEFAULT 0,
            htc INTEGER NOT NULL DEFAULT 0,
            refused_htc INTEGER NOT NULL DEFAULT 0,
            member_status TEXT,
            cloned INTEGER NOT NULL DEFAULT 0,
            consented_in_previous_round INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (internal_identifier, survey)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_household_member_household \
         ON household_member (household_identifier, survey)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_enrollment_checklist_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrollment_checklist (
            household_member_id TEXT PRIMARY KEY
                REFERENCES household_member(id) ON DELETE CASCADE,
            report_date DATE NOT NULL,
            dob DATE NOT NULL,
            initials TEXT NOT NULL,
            gender TEXT NOT NULL,
            has_identity TEXT NOT NULL,
            citizen TEXT NOT NULL,
            legal_marriage TEXT NOT NULL,
            marriage_certificate TEXT NOT NULL,
            part_time_resident TEXT NOT NULL,
            household_residency TEXT NOT NULL,
            literacy TEXT NOT NULL,
            guardian TEXT NOT NULL,
            confirm_participation TEXT NOT NULL,
            is_eligible INTEGER NOT NULL,
            loss_reason TEXT NOT NULL DEFAULT '',
            non_citizen INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_enrollment_loss_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrollment_loss (
            household_member_id TEXT PRIMARY KEY
                REFERENCES household_member(id) ON DELETE CASCADE,
            report_date DATE NOT NULL,
            loss_reason TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Parent table plus per-visit entry table for absent/undecided members
async fn create_visit_tables(pool: &SqlitePool, table: &str) -> Result<()> {
    let parent = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            household_member_id TEXT PRIMARY KEY
                REFERENCES household_member(id) ON DELETE CASCADE
        )
        "#
    );
    sqlx::query(&parent).execute(pool).await?;

    let entry = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table}_entry (
            household_member_id TEXT NOT NULL
                REFERENCES {table}(household_member_id) ON DELETE CASCADE,
            report_date DATE NOT NULL,
            reason TEXT NOT NULL,
            next_appointment DATE,
            PRIMARY KEY (household_member_id, report_date)
        )
        "#
    );
    sqlx::query(&entry).execute(pool).await?;

    Ok(())
}

async fn create_subject_refusal_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subject_refusal (
            household_member_id TEXT PRIMARY KEY
                REFERENCES household_member(id) ON DELETE CASCADE,
            refusal_date DATE NOT NULL,
            reason TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_deceased_member_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS deceased_member (
            household_member_id TEXT PRIMARY KEY
                REFERENCES household_member(id) ON DELETE CASCADE,
            death_date DATE NOT NULL,
            cause TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_htc_member_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS htc_member (
            household_member_id TEXT PRIMARY KEY
                REFERENCES household_member(id) ON DELETE CASCADE,
            report_date DATE NOT NULL,
            accepted INTEGER NOT NULL,
            referred INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn table_exists(pool: &SqlitePool, name: &str) -> bool {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_database_has_all_tables() {
        let pool = init_memory_database().await.unwrap();

        for table in [
            "household_member",
            "enrollment_checklist",
            "enrollment_loss",
            "subject_absentee",
            "subject_absentee_entry",
            "subject_undecided",
            "subject_undecided_entry",
            "subject_refusal",
            "deceased_member",
            "htc_member",
        ] {
            assert!(table_exists(&pool, table).await, "missing table {table}");
        }
    }

    #[tokio::test]
    async fn test_schema_preparation_is_idempotent() {
        let pool = init_memory_database().await.unwrap();
        prepare_schema(&pool).await.unwrap();
        prepare_schema(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let pool = init_memory_database().await.unwrap();
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}

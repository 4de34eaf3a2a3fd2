//! Schema-version bookkeeping
//!
//! **Idempotent migrator (§4.7, §6):** on startup, consumers create any
//! missing tables with `CREATE TABLE IF NOT EXISTS`, bump the schema
//! version here, and follow up with `schema_sync::SchemaSync::sync_table`
//! for any columns added since. This module only owns the
//! `schema_version` bookkeeping table; the table definitions themselves
//! are domain-specific and live with their owning crate.

use crate::Result;
use sqlx::SqlitePool;
use tracing::info;

/// Ensure the `schema_version` tracking table exists.
pub async fn ensure_schema_version_table(pool: &SqlitePool) -> Result<()> {
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

/// Current recorded schema version, or 0 if the table is empty/missing.
pub async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Record that `version` has been applied.
pub async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// A single migration step: takes the pool, returns its future boxed
/// so heterogeneous steps can share one `Vec`.
pub type MigrationStep<'a> =
    Box<dyn FnOnce(&'a SqlitePool) -> BoxFuture<'a, Result<()>> + Send + 'a>;

use futures::future::BoxFuture;

/// Run a caller-provided list of migration steps, skipping any whose
/// version is at or below the database's current version.
///
/// Each step stamps its own version on success — so a crash mid-run
/// leaves the version at the last fully-applied step rather than
/// marking a partially-run step done.
pub async fn run_migrations<'a>(
    pool: &'a SqlitePool,
    steps: Vec<(i32, MigrationStep<'a>)>,
) -> Result<()> {
    ensure_schema_version_table(pool).await?;
    let current = get_schema_version(pool).await?;

    for (version, step) in steps {
        if version <= current {
            continue;
        }
        step(pool).await?;
        set_schema_version(pool, version).await?;
        info!("applied migration v{version}");
    }

    Ok(())
}

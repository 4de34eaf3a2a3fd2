//! Append-only scan history (§3, §4.7): one row per album scan
//! attempt, used by the coordinator's resume filter.

use crate::model::{ScanHistoryEntry, ScanOutcome};
use chrono::{DateTime, Utc};
use ratings_common::Result;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

impl FromStr for ScanOutcome {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "ok" => Ok(ScanOutcome::Ok),
            "partial" => Ok(ScanOutcome::Partial),
            "failed" => Ok(ScanOutcome::Failed),
            "skipped" => Ok(ScanOutcome::Skipped),
            _ => Err(()),
        }
    }
}

pub async fn record_scan(pool: &SqlitePool, entry: &ScanHistoryEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scan_history
            (album_id, started_at, finished_at, outcome, tracks_scanned, singles_detected, error)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.album_id)
    .bind(entry.started_at)
    .bind(entry.finished_at)
    .bind(entry.outcome.as_str())
    .bind(entry.tracks_scanned)
    .bind(entry.singles_detected)
    .bind(&entry.error)
    .execute(pool)
    .await?;

    Ok(())
}

/// Same insert as [`record_scan`], scoped to a caller-managed
/// transaction (§4.7).
pub async fn record_scan_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    entry: &ScanHistoryEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scan_history
            (album_id, started_at, finished_at, outcome, tracks_scanned, singles_detected, error)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&entry.album_id)
    .bind(entry.started_at)
    .bind(entry.finished_at)
    .bind(entry.outcome.as_str())
    .bind(entry.tracks_scanned)
    .bind(entry.singles_detected)
    .bind(&entry.error)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Most recent scan outcome for an album, used by the resume filter
/// (§4.9) to decide whether to skip a previously-completed album.
pub async fn last_outcome_for_album(pool: &SqlitePool, album_id: &str) -> Result<Option<(ScanOutcome, DateTime<Utc>)>> {
    let row = sqlx::query(
        r#"SELECT outcome, started_at FROM scan_history
           WHERE album_id = ? ORDER BY started_at DESC LIMIT 1"#,
    )
    .bind(album_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| {
        let outcome_str: String = row.get("outcome");
        let outcome = ScanOutcome::from_str(&outcome_str).unwrap_or(ScanOutcome::Failed);
        (outcome, row.get("started_at"))
    }))
}

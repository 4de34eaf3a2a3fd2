//! Table definitions (§3, §4.7) and the `CREATE TABLE IF NOT EXISTS` +
//! [`SchemaSync`] bootstrap that keeps them current.

use ratings_common::db::schema_sync::{ColumnDefinition, SchemaSync, TableSchema};
use ratings_common::Result;
use sqlx::SqlitePool;

/// Bit set on `tracks.user_override_mask` when a human has manually
/// edited `stars` — the coordinator must not overwrite it on rescan.
pub const OVERRIDE_STARS: i64 = 1 << 0;
/// Bit set when a human has manually edited `is_single`.
pub const OVERRIDE_IS_SINGLE: i64 = 1 << 1;

pub struct ArtistsSchema;

impl TableSchema for ArtistsSchema {
    fn table_name() -> &'static str {
        "artists"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "TEXT").primary_key(),
            ColumnDefinition::new("name", "TEXT").not_null(),
            ColumnDefinition::new("musicbrainz_artist_id", "TEXT"),
            ColumnDefinition::new("spotify_artist_id", "TEXT"),
            ColumnDefinition::new("discogs_artist_id", "TEXT"),
            ColumnDefinition::new("last_scanned_at", "TIMESTAMP"),
        ]
    }
}

pub struct AlbumsSchema;

impl TableSchema for AlbumsSchema {
    fn table_name() -> &'static str {
        "albums"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "TEXT").primary_key(),
            ColumnDefinition::new("artist_id", "TEXT").not_null(),
            ColumnDefinition::new("title", "TEXT").not_null(),
            ColumnDefinition::new("normalized_title", "TEXT").not_null(),
            ColumnDefinition::new("album_type", "TEXT").not_null().default("'unknown'"),
            ColumnDefinition::new("release_year", "INTEGER"),
            ColumnDefinition::new("total_tracks", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("is_compilation", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("is_live", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("is_unplugged", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("cover_art_url", "TEXT"),
        ]
    }
}

pub struct TracksSchema;

impl TableSchema for TracksSchema {
    fn table_name() -> &'static str {
        "tracks"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "TEXT").primary_key(),
            ColumnDefinition::new("artist_id", "TEXT").not_null(),
            ColumnDefinition::new("album_id", "TEXT").not_null(),
            ColumnDefinition::new("title", "TEXT").not_null(),
            ColumnDefinition::new("track_number", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("disc_number", "INTEGER").not_null().default("1"),
            ColumnDefinition::new("duration_seconds", "REAL"),
            ColumnDefinition::new("isrc", "TEXT"),
            ColumnDefinition::new("musicbrainz_recording_id", "TEXT"),
            ColumnDefinition::new("spotify_track_id", "TEXT"),
            ColumnDefinition::new("spotify_artist_id", "TEXT"),
            ColumnDefinition::new("spotify_album_type", "TEXT"),
            ColumnDefinition::new("discogs_release_id", "INTEGER"),
            ColumnDefinition::new("popularity_score", "REAL"),
            ColumnDefinition::new("global_popularity", "REAL"),
            ColumnDefinition::new("album_zscore", "REAL"),
            ColumnDefinition::new("stars", "INTEGER"),
            ColumnDefinition::new("is_single", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("single_confidence", "TEXT"),
            ColumnDefinition::new("single_sources", "TEXT"),
            ColumnDefinition::new("user_override_mask", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("last_scanned_at", "TIMESTAMP"),
            ColumnDefinition::new("metadata_last_updated", "TIMESTAMP"),
        ]
    }
}

pub struct ScanHistorySchema;

impl TableSchema for ScanHistorySchema {
    fn table_name() -> &'static str {
        "scan_history"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("id", "INTEGER").primary_key(),
            ColumnDefinition::new("album_id", "TEXT").not_null(),
            ColumnDefinition::new("started_at", "TIMESTAMP").not_null(),
            ColumnDefinition::new("finished_at", "TIMESTAMP"),
            ColumnDefinition::new("outcome", "TEXT").not_null(),
            ColumnDefinition::new("tracks_scanned", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("singles_detected", "INTEGER").not_null().default("0"),
            ColumnDefinition::new("error", "TEXT"),
        ]
    }
}

pub struct SignalCacheSchema;

impl TableSchema for SignalCacheSchema {
    fn table_name() -> &'static str {
        "signal_cache"
    }

    fn expected_columns() -> Vec<ColumnDefinition> {
        vec![
            ColumnDefinition::new("cache_key", "TEXT").primary_key(),
            ColumnDefinition::new("payload", "TEXT").not_null(),
            ColumnDefinition::new("fetched_at", "TIMESTAMP").not_null(),
            ColumnDefinition::new("expires_at", "TIMESTAMP").not_null(),
        ]
    }
}

/// Create every table if missing, then sync columns for each against
/// its [`TableSchema`] (§4.7): the three-phase bootstrap documented in
/// `ratings_common::db::schema_sync`.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS artists (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS albums (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            title TEXT NOT NULL,
            normalized_title TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS tracks (
            id TEXT PRIMARY KEY,
            artist_id TEXT NOT NULL,
            album_id TEXT NOT NULL,
            title TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS scan_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            album_id TEXT NOT NULL,
            started_at TIMESTAMP NOT NULL,
            outcome TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS signal_cache (
            cache_key TEXT PRIMARY KEY,
            payload TEXT NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    SchemaSync::sync_table::<ArtistsSchema>(pool).await?;
    SchemaSync::sync_table::<AlbumsSchema>(pool).await?;
    SchemaSync::sync_table::<TracksSchema>(pool).await?;
    SchemaSync::sync_table::<ScanHistorySchema>(pool).await?;
    SchemaSync::sync_table::<SignalCacheSchema>(pool).await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_album_id ON tracks(album_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_albums_artist_id ON albums(artist_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_scan_history_album_id ON scan_history(album_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_isrc ON tracks(isrc)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_spotify_track_id ON tracks(spotify_track_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_stars ON tracks(stars)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_is_single ON tracks(is_single)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_artist_id ON tracks(artist_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tracks_artist_album ON tracks(artist_id, album_id)")
        .execute(pool)
        .await?;

    Ok(())
}

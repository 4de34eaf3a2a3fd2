//! Track persistence (§4.7): upserts honor `user_override_mask` so a
//! manually-edited `stars` or `is_single` survives a rescan.

use crate::db::schema::{OVERRIDE_IS_SINGLE, OVERRIDE_STARS};
use crate::model::{SingleConfidence, Track};
use chrono::{DateTime, Utc};
use ratings_common::Result;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

fn single_sources_to_json(sources: &[String]) -> String {
    serde_json::to_string(sources).unwrap_or_else(|_| "[]".to_string())
}

fn single_sources_from_json(raw: Option<String>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default()
}

/// Current `user_override_mask` for a track, 0 if the track doesn't
/// exist yet (an insert, not an update — nothing to preserve).
async fn existing_override_mask(pool: &SqlitePool, track_id: &str) -> Result<i64> {
    let mask: Option<i64> = sqlx::query_scalar("SELECT user_override_mask FROM tracks WHERE id = ?")
        .bind(track_id)
        .fetch_optional(pool)
        .await?;
    Ok(mask.unwrap_or(0))
}

/// Upsert a scanned track, leaving `stars`/`is_single` untouched where
/// the corresponding `OVERRIDE_*` bit is already set on the row.
pub async fn upsert_scanned_track(pool: &SqlitePool, track: &Track) -> Result<()> {
    let mask = existing_override_mask(pool, &track.id).await?;

    sqlx::query(
        r#"
        INSERT INTO tracks
            (id, artist_id, album_id, title, track_number, disc_number, duration_seconds,
             isrc, musicbrainz_recording_id, spotify_track_id, spotify_artist_id,
             spotify_album_type, discogs_release_id, popularity_score,
             global_popularity, album_zscore, stars, is_single, single_confidence,
             single_sources, user_override_mask, last_scanned_at, metadata_last_updated)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            artist_id = excluded.artist_id,
            album_id = excluded.album_id,
            title = excluded.title,
            track_number = excluded.track_number,
            disc_number = excluded.disc_number,
            duration_seconds = excluded.duration_seconds,
            isrc = excluded.isrc,
            musicbrainz_recording_id = excluded.musicbrainz_recording_id,
            spotify_track_id = excluded.spotify_track_id,
            spotify_artist_id = excluded.spotify_artist_id,
            spotify_album_type = excluded.spotify_album_type,
            discogs_release_id = excluded.discogs_release_id,
            popularity_score = excluded.popularity_score,
            global_popularity = excluded.global_popularity,
            album_zscore = excluded.album_zscore,
            stars = CASE WHEN tracks.user_override_mask & ? != 0 THEN tracks.stars ELSE excluded.stars END,
            is_single = CASE WHEN tracks.user_override_mask & ? != 0 THEN tracks.is_single ELSE excluded.is_single END,
            single_confidence = CASE WHEN tracks.user_override_mask & ? != 0 THEN tracks.single_confidence ELSE excluded.single_confidence END,
            single_sources = excluded.single_sources,
            last_scanned_at = excluded.last_scanned_at,
            metadata_last_updated = excluded.metadata_last_updated
        "#,
    )
    .bind(&track.id)
    .bind(&track.artist_id)
    .bind(&track.album_id)
    .bind(&track.title)
    .bind(track.track_number)
    .bind(track.disc_number)
    .bind(track.duration_seconds)
    .bind(&track.isrc)
    .bind(&track.musicbrainz_recording_id)
    .bind(&track.spotify_track_id)
    .bind(&track.spotify_artist_id)
    .bind(&track.spotify_album_type)
    .bind(track.discogs_release_id)
    .bind(track.popularity_score)
    .bind(track.global_popularity)
    .bind(track.album_zscore)
    .bind(track.stars)
    .bind(track.is_single)
    .bind(track.single_confidence.map(|c| c.as_str()))
    .bind(single_sources_to_json(&track.single_sources))
    .bind(mask)
    .bind(track.last_scanned_at)
    .bind(track.metadata_last_updated)
    .bind(OVERRIDE_STARS)
    .bind(OVERRIDE_IS_SINGLE)
    .bind(OVERRIDE_IS_SINGLE)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a user's manual override of `stars` (§3): sets the bit so
/// future scans leave this track's rating alone.
pub async fn set_user_star_override(pool: &SqlitePool, track_id: &str, stars: i32) -> Result<()> {
    sqlx::query(
        "UPDATE tracks SET stars = ?, user_override_mask = user_override_mask | ? WHERE id = ?",
    )
    .bind(stars)
    .bind(OVERRIDE_STARS)
    .bind(track_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn set_user_single_override(pool: &SqlitePool, track_id: &str, is_single: bool) -> Result<()> {
    sqlx::query(
        "UPDATE tracks SET is_single = ?, user_override_mask = user_override_mask | ? WHERE id = ?",
    )
    .bind(is_single)
    .bind(OVERRIDE_IS_SINGLE)
    .bind(track_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Batch-write a resolved Spotify artist ID to every existing track
/// row for that artist (§4.2 step 1): the lookup happens once per
/// artist, but every track needs the value, not just the `artists` row.
pub async fn set_artist_spotify_id(pool: &SqlitePool, artist_id: &str, spotify_artist_id: &str) -> Result<()> {
    sqlx::query("UPDATE tracks SET spotify_artist_id = ? WHERE artist_id = ?")
        .bind(spotify_artist_id)
        .bind(artist_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn row_to_track(row: sqlx::sqlite::SqliteRow) -> Track {
    let confidence_str: Option<String> = row.get("single_confidence");
    Track {
        id: row.get("id"),
        artist_id: row.get("artist_id"),
        album_id: row.get("album_id"),
        title: row.get("title"),
        track_number: row.get("track_number"),
        disc_number: row.get("disc_number"),
        duration_seconds: row.get("duration_seconds"),
        isrc: row.get("isrc"),
        musicbrainz_recording_id: row.get("musicbrainz_recording_id"),
        spotify_track_id: row.get("spotify_track_id"),
        spotify_artist_id: row.get("spotify_artist_id"),
        spotify_album_type: row.get("spotify_album_type"),
        discogs_release_id: row.get("discogs_release_id"),
        popularity_score: row.get("popularity_score"),
        global_popularity: row.get("global_popularity"),
        album_zscore: row.get("album_zscore"),
        stars: row.get("stars"),
        is_single: row.get("is_single"),
        single_confidence: confidence_str.and_then(|s| SingleConfidence::from_str(&s).ok()),
        single_sources: single_sources_from_json(row.get("single_sources")),
        last_scanned_at: row.get::<Option<DateTime<Utc>>, _>("last_scanned_at"),
        metadata_last_updated: row.get::<Option<DateTime<Utc>>, _>("metadata_last_updated"),
    }
}

const SELECT_COLUMNS: &str = r#"id, artist_id, album_id, title, track_number, disc_number, duration_seconds,
                  isrc, musicbrainz_recording_id, spotify_track_id, spotify_artist_id,
                  spotify_album_type, discogs_release_id, popularity_score,
                  global_popularity, album_zscore, stars, is_single, single_confidence,
                  single_sources, last_scanned_at, metadata_last_updated"#;

/// Same upsert as [`upsert_scanned_track`], scoped to a caller-managed
/// transaction so one album's tracks commit atomically (§4.7).
pub async fn upsert_scanned_track_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    track: &Track,
) -> Result<()> {
    let mask: Option<i64> = sqlx::query_scalar("SELECT user_override_mask FROM tracks WHERE id = ?")
        .bind(&track.id)
        .fetch_optional(&mut **tx)
        .await?;
    let mask = mask.unwrap_or(0);

    sqlx::query(
        r#"
        INSERT INTO tracks
            (id, artist_id, album_id, title, track_number, disc_number, duration_seconds,
             isrc, musicbrainz_recording_id, spotify_track_id, spotify_artist_id,
             spotify_album_type, discogs_release_id, popularity_score,
             global_popularity, album_zscore, stars, is_single, single_confidence,
             single_sources, user_override_mask, last_scanned_at, metadata_last_updated)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            artist_id = excluded.artist_id,
            album_id = excluded.album_id,
            title = excluded.title,
            track_number = excluded.track_number,
            disc_number = excluded.disc_number,
            duration_seconds = excluded.duration_seconds,
            isrc = excluded.isrc,
            musicbrainz_recording_id = excluded.musicbrainz_recording_id,
            spotify_track_id = excluded.spotify_track_id,
            spotify_artist_id = excluded.spotify_artist_id,
            spotify_album_type = excluded.spotify_album_type,
            discogs_release_id = excluded.discogs_release_id,
            popularity_score = excluded.popularity_score,
            global_popularity = excluded.global_popularity,
            album_zscore = excluded.album_zscore,
            stars = CASE WHEN tracks.user_override_mask & ? != 0 THEN tracks.stars ELSE excluded.stars END,
            is_single = CASE WHEN tracks.user_override_mask & ? != 0 THEN tracks.is_single ELSE excluded.is_single END,
            single_confidence = CASE WHEN tracks.user_override_mask & ? != 0 THEN tracks.single_confidence ELSE excluded.single_confidence END,
            single_sources = excluded.single_sources,
            last_scanned_at = excluded.last_scanned_at,
            metadata_last_updated = excluded.metadata_last_updated
        "#,
    )
    .bind(&track.id)
    .bind(&track.artist_id)
    .bind(&track.album_id)
    .bind(&track.title)
    .bind(track.track_number)
    .bind(track.disc_number)
    .bind(track.duration_seconds)
    .bind(&track.isrc)
    .bind(&track.musicbrainz_recording_id)
    .bind(&track.spotify_track_id)
    .bind(&track.spotify_artist_id)
    .bind(&track.spotify_album_type)
    .bind(track.discogs_release_id)
    .bind(track.popularity_score)
    .bind(track.global_popularity)
    .bind(track.album_zscore)
    .bind(track.stars)
    .bind(track.is_single)
    .bind(track.single_confidence.map(|c| c.as_str()))
    .bind(single_sources_to_json(&track.single_sources))
    .bind(mask)
    .bind(track.last_scanned_at)
    .bind(track.metadata_last_updated)
    .bind(OVERRIDE_STARS)
    .bind(OVERRIDE_IS_SINGLE)
    .bind(OVERRIDE_IS_SINGLE)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn list_tracks_for_album(pool: &SqlitePool, album_id: &str) -> Result<Vec<Track>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM tracks WHERE album_id = ? ORDER BY disc_number, track_number"
    );
    let rows = sqlx::query(&query).bind(album_id).fetch_all(pool).await?;

    Ok(rows.into_iter().map(row_to_track).collect())
}

/// Cross-album candidates sharing an ISRC or a normalized title, used
/// by `global_popularity` (§4.4) to find alternate-version siblings
/// outside the current album.
pub async fn find_candidates_by_isrc_or_title(
    pool: &SqlitePool,
    isrc: Option<&str>,
    normalized_title: &str,
) -> Result<Vec<Track>> {
    let query = format!(
        "SELECT {SELECT_COLUMNS} FROM tracks WHERE (isrc IS NOT NULL AND isrc = ?) OR LOWER(title) = LOWER(?)"
    );
    let rows = sqlx::query(&query)
        .bind(isrc.unwrap_or(""))
        .bind(normalized_title)
        .fetch_all(pool)
        .await?;

    Ok(rows.into_iter().map(row_to_track).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::init_schema;

    async fn setup() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_schema(&pool).await.unwrap();
        pool
    }

    fn sample(id: &str) -> Track {
        Track {
            id: id.to_string(),
            artist_id: "ar1".to_string(),
            album_id: "al1".to_string(),
            title: "Song".to_string(),
            track_number: 1,
            disc_number: 1,
            duration_seconds: Some(200.0),
            isrc: None,
            musicbrainz_recording_id: None,
            spotify_track_id: None,
            spotify_artist_id: None,
            spotify_album_type: None,
            discogs_release_id: None,
            popularity_score: Some(50.0),
            global_popularity: Some(50.0),
            album_zscore: Some(0.0),
            stars: Some(3),
            is_single: false,
            single_confidence: None,
            single_sources: vec![],
            last_scanned_at: Some(Utc::now()),
            metadata_last_updated: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_list_round_trips() {
        let pool = setup().await;
        upsert_scanned_track(&pool, &sample("t1")).await.unwrap();
        let tracks = list_tracks_for_album(&pool, "al1").await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].stars, Some(3));
    }

    #[tokio::test]
    async fn user_star_override_survives_rescan() {
        let pool = setup().await;
        upsert_scanned_track(&pool, &sample("t1")).await.unwrap();
        set_user_star_override(&pool, "t1", 5).await.unwrap();

        let mut rescanned = sample("t1");
        rescanned.stars = Some(2);
        upsert_scanned_track(&pool, &rescanned).await.unwrap();

        let tracks = list_tracks_for_album(&pool, "al1").await.unwrap();
        assert_eq!(tracks[0].stars, Some(5));
    }

    #[tokio::test]
    async fn without_override_rescan_replaces_stars() {
        let pool = setup().await;
        upsert_scanned_track(&pool, &sample("t1")).await.unwrap();

        let mut rescanned = sample("t1");
        rescanned.stars = Some(1);
        upsert_scanned_track(&pool, &rescanned).await.unwrap();

        let tracks = list_tracks_for_album(&pool, "al1").await.unwrap();
        assert_eq!(tracks[0].stars, Some(1));
    }

    #[tokio::test]
    async fn set_artist_spotify_id_batches_across_all_of_an_artists_tracks() {
        let pool = setup().await;
        let mut t2 = sample("t2");
        t2.id = "t2".to_string();
        upsert_scanned_track(&pool, &sample("t1")).await.unwrap();
        upsert_scanned_track(&pool, &t2).await.unwrap();

        set_artist_spotify_id(&pool, "ar1", "spotify-artist-1").await.unwrap();

        let tracks = list_tracks_for_album(&pool, "al1").await.unwrap();
        assert!(tracks.iter().all(|t| t.spotify_artist_id.as_deref() == Some("spotify-artist-1")));
    }
}

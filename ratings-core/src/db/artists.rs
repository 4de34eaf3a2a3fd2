//! Artist persistence.

use crate::model::Artist;
use chrono::{DateTime, Utc};
use ratings_common::Result;
use sqlx::{Row, SqlitePool};

pub async fn upsert_artist(pool: &SqlitePool, artist: &Artist) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO artists (id, name, musicbrainz_artist_id, spotify_artist_id, discogs_artist_id, last_scanned_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            musicbrainz_artist_id = excluded.musicbrainz_artist_id,
            spotify_artist_id = excluded.spotify_artist_id,
            discogs_artist_id = excluded.discogs_artist_id,
            last_scanned_at = excluded.last_scanned_at
        "#,
    )
    .bind(&artist.id)
    .bind(&artist.name)
    .bind(&artist.musicbrainz_artist_id)
    .bind(&artist.spotify_artist_id)
    .bind(&artist.discogs_artist_id)
    .bind(artist.last_scanned_at)
    .execute(pool)
    .await?;

    Ok(())
}

pub async fn load_artist(pool: &SqlitePool, id: &str) -> Result<Option<Artist>> {
    let row = sqlx::query(
        r#"SELECT id, name, musicbrainz_artist_id, spotify_artist_id, discogs_artist_id, last_scanned_at
           FROM artists WHERE id = ?"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(|row| Artist {
        id: row.get("id"),
        name: row.get("name"),
        musicbrainz_artist_id: row.get("musicbrainz_artist_id"),
        spotify_artist_id: row.get("spotify_artist_id"),
        discogs_artist_id: row.get("discogs_artist_id"),
        last_scanned_at: row.get::<Option<DateTime<Utc>>, _>("last_scanned_at"),
    }))
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

    #[tokio::test]
    async fn upsert_then_load_round_trips() {
        let pool = setup().await;
        let artist = Artist {
            id: "a1".to_string(),
            name: "Test Artist".to_string(),
            musicbrainz_artist_id: Some("mb1".to_string()),
            spotify_artist_id: None,
            discogs_artist_id: None,
            last_scanned_at: Some(Utc::now()),
        };
        upsert_artist(&pool, &artist).await.unwrap();
        let loaded = load_artist(&pool, "a1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "Test Artist");
        assert_eq!(loaded.musicbrainz_artist_id.as_deref(), Some("mb1"));
    }

    #[tokio::test]
    async fn upsert_is_idempotent_and_updates_fields() {
        let pool = setup().await;
        let mut artist = Artist {
            id: "a1".to_string(),
            name: "Old Name".to_string(),
            musicbrainz_artist_id: None,
            spotify_artist_id: None,
            discogs_artist_id: None,
            last_scanned_at: None,
        };
        upsert_artist(&pool, &artist).await.unwrap();
        artist.name = "New Name".to_string();
        upsert_artist(&pool, &artist).await.unwrap();

        let loaded = load_artist(&pool, "a1").await.unwrap().unwrap();
        assert_eq!(loaded.name, "New Name");
    }
}

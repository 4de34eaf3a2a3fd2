//! Album persistence.

use crate::model::{Album, AlbumType};
use ratings_common::{Error, Result};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

impl AlbumType {
    fn as_str(&self) -> &'static str {
        match self {
            AlbumType::Album => "album",
            AlbumType::Single => "single",
            AlbumType::Compilation => "compilation",
            AlbumType::Ep => "ep",
            AlbumType::Unknown => "unknown",
        }
    }
}

impl FromStr for AlbumType {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "album" => Ok(AlbumType::Album),
            "single" => Ok(AlbumType::Single),
            "compilation" => Ok(AlbumType::Compilation),
            "ep" => Ok(AlbumType::Ep),
            _ => Ok(AlbumType::Unknown),
        }
    }
}

pub async fn upsert_album(pool: &SqlitePool, album: &Album) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO albums
            (id, artist_id, title, normalized_title, album_type, release_year,
             total_tracks, is_compilation, is_live, is_unplugged, cover_art_url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            artist_id = excluded.artist_id,
            title = excluded.title,
            normalized_title = excluded.normalized_title,
            album_type = excluded.album_type,
            release_year = excluded.release_year,
            total_tracks = excluded.total_tracks,
            is_compilation = excluded.is_compilation,
            is_live = excluded.is_live,
            is_unplugged = excluded.is_unplugged,
            cover_art_url = excluded.cover_art_url
        "#,
    )
    .bind(&album.id)
    .bind(&album.artist_id)
    .bind(&album.title)
    .bind(&album.normalized_title)
    .bind(album.album_type.as_str())
    .bind(album.release_year)
    .bind(album.total_tracks)
    .bind(album.is_compilation)
    .bind(album.is_live)
    .bind(album.is_unplugged)
    .bind(&album.cover_art_url)
    .execute(pool)
    .await?;

    Ok(())
}

/// Same upsert as [`upsert_album`], scoped to a caller-managed
/// transaction so an album and its tracks commit atomically (§4.7).
pub async fn upsert_album_tx(tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>, album: &Album) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO albums
            (id, artist_id, title, normalized_title, album_type, release_year,
             total_tracks, is_compilation, is_live, is_unplugged, cover_art_url)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            artist_id = excluded.artist_id,
            title = excluded.title,
            normalized_title = excluded.normalized_title,
            album_type = excluded.album_type,
            release_year = excluded.release_year,
            total_tracks = excluded.total_tracks,
            is_compilation = excluded.is_compilation,
            is_live = excluded.is_live,
            is_unplugged = excluded.is_unplugged,
            cover_art_url = excluded.cover_art_url
        "#,
    )
    .bind(&album.id)
    .bind(&album.artist_id)
    .bind(&album.title)
    .bind(&album.normalized_title)
    .bind(album.album_type.as_str())
    .bind(album.release_year)
    .bind(album.total_tracks)
    .bind(album.is_compilation)
    .bind(album.is_live)
    .bind(album.is_unplugged)
    .bind(&album.cover_art_url)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

pub async fn load_album(pool: &SqlitePool, id: &str) -> Result<Option<Album>> {
    let row = sqlx::query(
        r#"SELECT id, artist_id, title, normalized_title, album_type, release_year,
                  total_tracks, is_compilation, is_live, is_unplugged, cover_art_url
           FROM albums WHERE id = ?"#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else { return Ok(None) };

    let album_type_str: String = row.get("album_type");
    let album_type = AlbumType::from_str(&album_type_str).map_err(|_| {
        Error::Internal(format!("invalid album_type stored for album {id}"))
    })?;

    Ok(Some(Album {
        id: row.get("id"),
        artist_id: row.get("artist_id"),
        title: row.get("title"),
        normalized_title: row.get("normalized_title"),
        album_type,
        release_year: row.get("release_year"),
        total_tracks: row.get("total_tracks"),
        is_compilation: row.get("is_compilation"),
        is_live: row.get("is_live"),
        is_unplugged: row.get("is_unplugged"),
        cover_art_url: row.get("cover_art_url"),
    }))
}

pub async fn list_albums_for_artist(pool: &SqlitePool, artist_id: &str) -> Result<Vec<Album>> {
    let rows = sqlx::query(
        r#"SELECT id, artist_id, title, normalized_title, album_type, release_year,
                  total_tracks, is_compilation, is_live, is_unplugged, cover_art_url
           FROM albums WHERE artist_id = ? ORDER BY release_year, title"#,
    )
    .bind(artist_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|row| {
            let album_type_str: String = row.get("album_type");
            let album_type = AlbumType::from_str(&album_type_str).unwrap_or(AlbumType::Unknown);
            Ok(Album {
                id: row.get("id"),
                artist_id: row.get("artist_id"),
                title: row.get("title"),
                normalized_title: row.get("normalized_title"),
                album_type,
                release_year: row.get("release_year"),
                total_tracks: row.get("total_tracks"),
                is_compilation: row.get("is_compilation"),
                is_live: row.get("is_live"),
                is_unplugged: row.get("is_unplugged"),
                cover_art_url: row.get("cover_art_url"),
            })
        })
        .collect()
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

    fn sample(id: &str, artist_id: &str) -> Album {
        Album {
            id: id.to_string(),
            artist_id: artist_id.to_string(),
            title: "Title".to_string(),
            normalized_title: "title".to_string(),
            album_type: AlbumType::Album,
            release_year: Some(2001),
            total_tracks: 10,
            is_compilation: false,
            is_live: false,
            is_unplugged: false,
            cover_art_url: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_load_round_trips_album_type() {
        let pool = setup().await;
        let album = sample("al1", "ar1");
        upsert_album(&pool, &album).await.unwrap();
        let loaded = load_album(&pool, "al1").await.unwrap().unwrap();
        assert_eq!(loaded.album_type, AlbumType::Album);
        assert_eq!(loaded.total_tracks, 10);
    }

    #[tokio::test]
    async fn list_albums_for_artist_filters_by_artist() {
        let pool = setup().await;
        upsert_album(&pool, &sample("al1", "ar1")).await.unwrap();
        upsert_album(&pool, &sample("al2", "ar2")).await.unwrap();
        let albums = list_albums_for_artist(&pool, "ar1").await.unwrap();
        assert_eq!(albums.len(), 1);
        assert_eq!(albums[0].id, "al1");
    }
}

//! The music-server collaborator (§6): a trait so the coordinator can
//! run against a real subsonic-style HTTP endpoint in production and
//! an in-memory fake in tests.

use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumRef {
    pub id: String,
    pub title: String,
    pub year: Option<i32>,
    pub track_count: i32,
    #[serde(rename = "type")]
    pub album_type: Option<String>,
    pub cover_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackRef {
    pub id: String,
    pub title: String,
    pub track_no: i32,
    pub disc_no: i32,
    pub duration: Option<f64>,
    pub artist: String,
    pub album: String,
    pub genre: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum MusicServerError {
    #[error("music server request failed: {0}")]
    Request(String),
    #[error("music server returned an error status: {0}")]
    Status(u16),
}

#[async_trait]
pub trait MusicServerClient: Send + Sync {
    async fn list_artists(&self) -> Result<Vec<ArtistRef>, MusicServerError>;
    async fn list_albums(&self, artist_id: &str) -> Result<Vec<AlbumRef>, MusicServerError>;
    async fn list_tracks(&self, album_id: &str) -> Result<Vec<TrackRef>, MusicServerError>;
    async fn set_rating(&self, track_id: &str, stars: u8) -> Result<(), MusicServerError>;
}

/// Subsonic-style HTTP implementation of [`MusicServerClient`].
pub struct HttpMusicServerClient {
    client: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
}

impl HttpMusicServerClient {
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        HttpMusicServerClient {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            base_url: base_url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    fn auth_params(&self) -> [(&str, &str); 4] {
        [
            ("u", self.username.as_str()),
            ("p", self.password.as_str()),
            ("v", "1.16.1"),
            ("c", "ratings-core"),
        ]
    }
}

#[async_trait]
impl MusicServerClient for HttpMusicServerClient {
    async fn list_artists(&self) -> Result<Vec<ArtistRef>, MusicServerError> {
        let url = format!("{}/rest/getArtists.view", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&self.auth_params())
            .query(&[("f", "json")])
            .send()
            .await
            .map_err(|e| MusicServerError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MusicServerError::Status(resp.status().as_u16()));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MusicServerError::Request(e.to_string()))?;
        parse_artists(&body)
    }

    async fn list_albums(&self, artist_id: &str) -> Result<Vec<AlbumRef>, MusicServerError> {
        let url = format!("{}/rest/getArtist.view", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&self.auth_params())
            .query(&[("f", "json"), ("id", artist_id)])
            .send()
            .await
            .map_err(|e| MusicServerError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MusicServerError::Status(resp.status().as_u16()));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MusicServerError::Request(e.to_string()))?;
        parse_albums(&body)
    }

    async fn list_tracks(&self, album_id: &str) -> Result<Vec<TrackRef>, MusicServerError> {
        let url = format!("{}/rest/getAlbum.view", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&self.auth_params())
            .query(&[("f", "json"), ("id", album_id)])
            .send()
            .await
            .map_err(|e| MusicServerError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MusicServerError::Status(resp.status().as_u16()));
        }
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| MusicServerError::Request(e.to_string()))?;
        parse_tracks(&body)
    }

    async fn set_rating(&self, track_id: &str, stars: u8) -> Result<(), MusicServerError> {
        let url = format!("{}/rest/setRating.view", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&self.auth_params())
            .query(&[("f", "json"), ("id", track_id), ("rating", &stars.to_string())])
            .send()
            .await
            .map_err(|e| MusicServerError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(MusicServerError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

fn parse_artists(body: &serde_json::Value) -> Result<Vec<ArtistRef>, MusicServerError> {
    let indices = body
        .pointer("/subsonic-response/artists/index")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for index in indices {
        if let Some(artists) = index.get("artist").and_then(|v| v.as_array()) {
            for a in artists {
                if let (Some(id), Some(name)) = (
                    a.get("id").and_then(|v| v.as_str()),
                    a.get("name").and_then(|v| v.as_str()),
                ) {
                    out.push(ArtistRef {
                        id: id.to_string(),
                        name: name.to_string(),
                    });
                }
            }
        }
    }
    Ok(out)
}

fn parse_albums(body: &serde_json::Value) -> Result<Vec<AlbumRef>, MusicServerError> {
    let albums = body
        .pointer("/subsonic-response/artist/album")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for a in albums {
        let id = a.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let title = a.get("name").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        out.push(AlbumRef {
            id,
            title,
            year: a.get("year").and_then(|v| v.as_i64()).map(|v| v as i32),
            track_count: a.get("songCount").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
            album_type: a.get("genre").and_then(|v| v.as_str()).map(|s| s.to_string()),
            cover_url: a.get("coverArt").and_then(|v| v.as_str()).map(|s| s.to_string()),
        });
    }
    Ok(out)
}

fn parse_tracks(body: &serde_json::Value) -> Result<Vec<TrackRef>, MusicServerError> {
    let songs = body
        .pointer("/subsonic-response/album/song")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    let mut out = Vec::new();
    for s in songs {
        out.push(TrackRef {
            id: s.get("id").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            title: s.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            track_no: s.get("track").and_then(|v| v.as_i64()).unwrap_or(0) as i32,
            disc_no: s.get("discNumber").and_then(|v| v.as_i64()).unwrap_or(1) as i32,
            duration: s.get("duration").and_then(|v| v.as_f64()),
            artist: s.get("artist").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            album: s.get("album").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            genre: s.get("genre").and_then(|v| v.as_str()).map(|s| s.to_string()),
        });
    }
    Ok(out)
}

//! Spotify Web API client (§4.1, §4.3).

use super::rate_limiter::{Backoff, RateLimiter};
use super::{execute_with_retry, ProviderName};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyTrack {
    pub id: String,
    pub name: String,
    pub popularity: u32,
    pub duration_ms: u64,
    pub explicit: bool,
    #[serde(default)]
    pub external_ids: ExternalIds,
    pub album: SpotifyAlbumRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExternalIds {
    pub isrc: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyAlbumRef {
    pub album_type: String,
    pub total_tracks: u32,
    pub release_date: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotifyAudioFeatures {
    pub id: String,
    pub tempo: f64,
    pub energy: f64,
    pub danceability: f64,
    pub valence: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub speechiness: f64,
    pub loudness: f64,
    pub key: i32,
    pub mode: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub id: String,
    pub name: String,
    pub popularity: u32,
    #[serde(default)]
    pub genres: Vec<String>,
}

#[derive(Deserialize)]
struct SearchTrackResponse {
    tracks: SearchTrackItems,
}

#[derive(Deserialize)]
struct SearchTrackItems {
    items: Vec<SpotifyTrack>,
}

#[derive(Deserialize)]
struct AudioFeaturesResponse {
    audio_features: Vec<Option<SpotifyAudioFeatures>>,
}

#[derive(Deserialize)]
struct SearchArtistResponse {
    artists: SearchArtistItems,
}

#[derive(Deserialize)]
struct SearchArtistItems {
    items: Vec<SpotifyArtist>,
}

pub struct SpotifyClient {
    http: reqwest::Client,
    base_url: String,
    access_token: std::sync::RwLock<String>,
    limiter: RateLimiter,
    backoff: Backoff,
}

impl SpotifyClient {
    pub fn new(access_token: String, requests_per_minute: u32) -> Self {
        Self::with_base_url("https://api.spotify.com/v1".to_string(), access_token, requests_per_minute)
    }

    /// Same as [`SpotifyClient::new`] but pointed at an arbitrary base
    /// URL, so tests can aim the client at a mock server.
    pub fn with_base_url(base_url: String, access_token: String, requests_per_minute: u32) -> Self {
        SpotifyClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            base_url,
            access_token: std::sync::RwLock::new(access_token),
            limiter: RateLimiter::per_minute(requests_per_minute),
            backoff: Backoff::default(),
        }
    }

    /// Replace the bearer token in place so callers don't have to
    /// rebuild (and re-share) the client when credentials rotate
    /// mid-run — the historic "singleton ignored token change" bug
    /// this must not reproduce (§4.1, invariant 10).
    pub fn set_access_token(&self, token: String) {
        *self.access_token.write().expect("lock poisoned") = token;
    }

    fn bearer(&self) -> String {
        self.access_token.read().expect("lock poisoned").clone()
    }

    pub async fn search_artist(&self, name: &str) -> Result<Option<SpotifyArtist>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let resp = execute_with_retry(ProviderName::Spotify, &url, &self.limiter, &self.backoff, || {
            self.http
                .get(&url)
                .bearer_auth(self.bearer())
                .query(&[("q", name), ("type", "artist"), ("limit", "1")])
        })
        .await?;

        let parsed: SearchArtistResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(parsed.artists.items.into_iter().next())
    }

    pub async fn search_track(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<SpotifyTrack>, ProviderError> {
        let url = format!("{}/search", self.base_url);
        let q = format!("track:{title} artist:{artist}");
        let resp = execute_with_retry(ProviderName::Spotify, &url, &self.limiter, &self.backoff, || {
            self.http
                .get(&url)
                .bearer_auth(self.bearer())
                .query(&[("q", q.as_str()), ("type", "track"), ("limit", "10")])
        })
        .await?;

        let parsed: SearchTrackResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(parsed.tracks.items)
    }

    /// Batched audio-features lookup, ≤100 IDs per call (§4.3).
    pub async fn audio_features(
        &self,
        track_ids: &[String],
    ) -> Result<Vec<Option<SpotifyAudioFeatures>>, ProviderError> {
        if track_ids.is_empty() {
            return Ok(Vec::new());
        }
        if track_ids.len() > 100 {
            return Err(ProviderError::Unknown(
                "audio_features: batch exceeds 100 ids".to_string(),
            ));
        }

        let url = format!("{}/audio-features", self.base_url);
        let ids = track_ids.join(",");
        let resp = execute_with_retry(ProviderName::Spotify, &url, &self.limiter, &self.backoff, || {
            self.http.get(&url).bearer_auth(self.bearer()).query(&[("ids", ids.as_str())])
        })
        .await?;

        let parsed: AudioFeaturesResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(parsed.audio_features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn set_access_token_replaces_bearer() {
        let client = SpotifyClient::new("old-token".to_string(), 180);
        assert_eq!(client.bearer(), "old-token");
        client.set_access_token("new-token".to_string());
        assert_eq!(client.bearer(), "new-token");
    }

    #[tokio::test]
    async fn search_track_parses_a_mocked_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "tracks": {
                    "items": [{
                        "id": "track1",
                        "name": "Track One",
                        "popularity": 70,
                        "duration_ms": 200000,
                        "explicit": false,
                        "external_ids": {"isrc": "US1234567890"},
                        "album": {"album_type": "single", "total_tracks": 1, "release_date": "2020-01-01"},
                    }]
                }
            })))
            .mount(&server)
            .await;

        let client = SpotifyClient::with_base_url(server.uri(), "token".to_string(), 180);
        let tracks = client.search_track("Some Artist", "Track One").await.unwrap();
        assert_eq!(tracks.len(), 1);
        assert_eq!(tracks[0].id, "track1");
        assert_eq!(tracks[0].external_ids.isrc.as_deref(), Some("US1234567890"));
        assert_eq!(tracks[0].album.album_type, "single");
    }

    #[tokio::test]
    async fn search_track_maps_401_to_unauthorized() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = SpotifyClient::with_base_url(server.uri(), "expired-token".to_string(), 180);
        let result = client.search_track("Some Artist", "Track One").await;
        assert!(matches!(result, Err(ProviderError::Unauthorized)));
    }
}

//! Discogs API client (§4.1, §4.3).

use super::rate_limiter::{Backoff, RateLimiter};
use super::{execute_with_retry, ProviderName};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscogsFormat {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub format_type: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscogsVideo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscogsRelease {
    pub id: u64,
    #[serde(default)]
    pub formats: Vec<DiscogsFormat>,
    #[serde(default)]
    pub videos: Vec<DiscogsVideo>,
    #[serde(default)]
    pub tracklist: Vec<serde_json::Value>,
}

impl DiscogsRelease {
    pub fn has_single_format(&self) -> bool {
        self.formats
            .iter()
            .any(|f| f.format_type.as_deref() == Some("Single") || f.name.to_lowercase().contains("single"))
    }

    pub fn is_short_release(&self) -> bool {
        self.tracklist.len() <= 2
    }

    /// An "official"/"lyric" video whose title or description
    /// references `normalized_track_title`, excluding anything marked
    /// live/remix (§4.6 Discogs-official-video hit condition).
    pub fn has_official_video_for(&self, normalized_track_title: &str) -> bool {
        self.videos.iter().any(|v| {
            let haystack = format!("{} {}", v.title, v.description).to_lowercase();
            let mentions_track = haystack.contains(normalized_track_title);
            let is_official = haystack.contains("official") || haystack.contains("lyric");
            let is_excluded = haystack.contains("live") || haystack.contains("remix");
            mentions_track && is_official && !is_excluded
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Deserialize)]
struct SearchResult {
    id: u64,
}

pub struct DiscogsClient {
    http: reqwest::Client,
    token: std::sync::RwLock<String>,
    limiter: RateLimiter,
    backoff: Backoff,
}

impl DiscogsClient {
    pub fn new(token: String, requests_per_minute: u32) -> Self {
        DiscogsClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            token: std::sync::RwLock::new(token),
            limiter: RateLimiter::per_minute(requests_per_minute),
            backoff: Backoff::default(),
        }
    }

    pub fn set_token(&self, token: String) {
        *self.token.write().expect("lock poisoned") = token;
    }

    fn token_value(&self) -> String {
        self.token.read().expect("lock poisoned").clone()
    }

    /// Search by "artist + album" for a release ID (§4.2 step 5).
    pub async fn search_release(
        &self,
        artist: &str,
        album: &str,
    ) -> Result<Option<u64>, ProviderError> {
        let token = self.token_value();
        let url = "https://api.discogs.com/database/search";
        let resp = execute_with_retry(ProviderName::Discogs, url, &self.limiter, &self.backoff, || {
            self.http.get(url).query(&[
                ("artist", artist),
                ("release_title", album),
                ("type", "release"),
                ("token", token.as_str()),
            ])
        })
        .await?;

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(parsed.results.first().map(|r| r.id))
    }

    pub async fn release(&self, release_id: u64) -> Result<DiscogsRelease, ProviderError> {
        let token = self.token_value();
        let url = format!("https://api.discogs.com/releases/{release_id}");
        let resp = execute_with_retry(ProviderName::Discogs, &url, &self.limiter, &self.backoff, || {
            self.http.get(&url).query(&[("token", token.as_str())])
        })
        .await?;

        resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(formats: Vec<DiscogsFormat>, videos: Vec<DiscogsVideo>) -> DiscogsRelease {
        DiscogsRelease {
            id: 1,
            formats,
            videos,
            tracklist: vec![],
        }
    }

    #[test]
    fn has_single_format_matches_type_field() {
        let r = release(
            vec![DiscogsFormat {
                name: "Vinyl".to_string(),
                format_type: Some("Single".to_string()),
            }],
            vec![],
        );
        assert!(r.has_single_format());
    }

    #[test]
    fn has_single_format_matches_name_substring() {
        let r = release(
            vec![DiscogsFormat {
                name: "7\" Single".to_string(),
                format_type: None,
            }],
            vec![],
        );
        assert!(r.has_single_format());
    }

    #[test]
    fn official_video_excludes_remix_mentions() {
        let r = release(
            vec![],
            vec![DiscogsVideo {
                title: "Song Title (Official Remix Video)".to_string(),
                description: String::new(),
            }],
        );
        assert!(!r.has_official_video_for("song title"));
    }

    #[test]
    fn official_video_matches_lyric_video() {
        let r = release(
            vec![],
            vec![DiscogsVideo {
                title: "Song Title (Official Lyric Video)".to_string(),
                description: String::new(),
            }],
        );
        assert!(r.has_official_video_for("song title"));
    }
}

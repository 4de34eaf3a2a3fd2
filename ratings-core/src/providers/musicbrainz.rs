//! MusicBrainz API client (§4.1, §4.3). Rate is a hard 1 req/sec per
//! MusicBrainz's own usage policy, not merely a configurable default;
//! short 5s timeout and a tight 1/2/4s backoff on network errors.

use super::rate_limiter::{Backoff, RateLimiter};
use super::{execute_with_retry, ProviderName};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MbRecording {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(rename = "artist-credit", default)]
    pub artist_credit: Vec<MbArtistCredit>,
    #[serde(default)]
    pub releases: Vec<MbRelease>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MbArtistCredit {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MbRelease {
    pub id: String,
    pub title: String,
    pub date: Option<String>,
    #[serde(rename = "release-group", default)]
    pub release_group: Option<MbReleaseGroup>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MbReleaseGroup {
    #[serde(rename = "primary-type")]
    pub primary_type: Option<String>,
    #[serde(rename = "secondary-types", default)]
    pub secondary_types: Vec<String>,
}

#[derive(Deserialize)]
struct RecordingSearchResponse {
    #[serde(default)]
    recordings: Vec<MbRecording>,
}

pub struct MusicBrainzClient {
    http: reqwest::Client,
    base_url: String,
    user_agent: String,
    limiter: RateLimiter,
    backoff: Backoff,
}

impl MusicBrainzClient {
    pub fn new(user_agent: String) -> Self {
        MusicBrainzClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .expect("failed to build HTTP client"),
            base_url: "https://musicbrainz.org/ws/2".to_string(),
            user_agent,
            limiter: RateLimiter::per_second(1),
            backoff: Backoff {
                base: Duration::from_secs(1),
                cap: Duration::from_secs(4),
                max_attempts: 3,
            },
        }
    }

    pub async fn lookup_recording(&self, mbid: &str) -> Result<MbRecording, ProviderError> {
        let url = format!(
            "{}/recording/{mbid}?inc=artist-credits+releases+release-groups&fmt=json",
            self.base_url
        );
        let resp = execute_with_retry(ProviderName::MusicBrainz, &url, &self.limiter, &self.backoff, || {
            self.http.get(&url).header("User-Agent", &self.user_agent)
        })
        .await?;

        resp.json().await.map_err(|e| ProviderError::Malformed(e.to_string()))
    }

    pub async fn search_recording(
        &self,
        artist: &str,
        title: &str,
    ) -> Result<Vec<MbRecording>, ProviderError> {
        let query = format!("artist:\"{artist}\" AND recording:\"{title}\"");
        let url = format!("{}/recording", self.base_url);
        let resp = execute_with_retry(ProviderName::MusicBrainz, &url, &self.limiter, &self.backoff, || {
            self.http
                .get(&url)
                .header("User-Agent", &self.user_agent)
                .query(&[("query", query.as_str()), ("fmt", "json")])
        })
        .await?;

        let parsed: RecordingSearchResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        Ok(parsed.recordings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_uses_one_request_per_second() {
        let client = MusicBrainzClient::new("test/1.0".to_string());
        assert!(client.base_url.contains("musicbrainz.org"));
    }
}

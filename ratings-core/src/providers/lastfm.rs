//! Last.fm API client (§4.1, §4.3).

use super::rate_limiter::{Backoff, RateLimiter};
use super::{execute_with_retry, ProviderName};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastFmTrackInfo {
    pub listeners: u64,
    pub playcount: u64,
    #[serde(default)]
    pub top_tags: Vec<String>,
}

#[derive(Deserialize)]
struct TrackInfoResponse {
    track: TrackInfoBody,
}

#[derive(Deserialize)]
struct TrackInfoBody {
    listeners: String,
    playcount: String,
    #[serde(default)]
    toptags: Option<TopTags>,
}

#[derive(Deserialize)]
struct TopTags {
    #[serde(default)]
    tag: Vec<Tag>,
}

#[derive(Deserialize)]
struct Tag {
    name: String,
}

pub struct LastFmClient {
    http: reqwest::Client,
    api_key: std::sync::RwLock<String>,
    limiter: RateLimiter,
    backoff: Backoff,
}

impl LastFmClient {
    pub fn new(api_key: String, requests_per_second: u32) -> Self {
        LastFmClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            api_key: std::sync::RwLock::new(api_key),
            limiter: RateLimiter::per_second(requests_per_second),
            backoff: Backoff::default(),
        }
    }

    pub fn set_api_key(&self, api_key: String) {
        *self.api_key.write().expect("lock poisoned") = api_key;
    }

    fn key(&self) -> String {
        self.api_key.read().expect("lock poisoned").clone()
    }

    pub async fn track_info(
        &self,
        artist: &str,
        track: &str,
    ) -> Result<LastFmTrackInfo, ProviderError> {
        let key = self.key();
        let url = "https://ws.audioscrobbler.com/2.0/";
        let resp = execute_with_retry(ProviderName::LastFm, url, &self.limiter, &self.backoff, || {
            self.http.get(url).query(&[
                ("method", "track.getInfo"),
                ("api_key", key.as_str()),
                ("artist", artist),
                ("track", track),
                ("format", "json"),
            ])
        })
        .await?;

        let parsed: TrackInfoResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let listeners = parsed.track.listeners.parse().unwrap_or(0);
        let playcount = parsed.track.playcount.parse().unwrap_or(0);
        let top_tags = parsed
            .track
            .toptags
            .map(|t| t.tag.into_iter().map(|tag| tag.name).collect())
            .unwrap_or_default();

        Ok(LastFmTrackInfo {
            listeners,
            playcount,
            top_tags,
        })
    }
}

/// Log-normalize a raw count against an adaptive ceiling (§4.4): used
/// both for Last.fm playcount and the ListenBrainz listen count.
pub fn log_normalize(count: u64, global_max_seen: f64) -> f64 {
    if global_max_seen <= 0.0 {
        return 0.0;
    }
    100.0 * (1.0 + count as f64).log10() / (1.0 + global_max_seen).log10()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_normalize_zero_count_is_zero() {
        assert_eq!(log_normalize(0, 1e7), 0.0);
    }

    #[test]
    fn log_normalize_at_ceiling_is_100() {
        let v = log_normalize(10_000_000, 1e7);
        assert!((v - 100.0).abs() < 1e-6);
    }

    #[test]
    fn log_normalize_is_monotonic() {
        assert!(log_normalize(1000, 1e7) < log_normalize(100_000, 1e7));
    }
}

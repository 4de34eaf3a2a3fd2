//! ListenBrainz API client (§4.1, §4.3).

use super::rate_limiter::{Backoff, RateLimiter};
use super::{execute_with_retry, ProviderName};
use crate::error::ProviderError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListenBrainzListenCount {
    pub listen_count: u64,
}

#[derive(Deserialize)]
struct RecordingStatsResponse {
    payload: RecordingStatsPayload,
}

#[derive(Deserialize)]
struct RecordingStatsPayload {
    #[serde(default)]
    total_listen_count: u64,
}

pub struct ListenBrainzClient {
    http: reqwest::Client,
    token: std::sync::RwLock<Option<String>>,
    limiter: RateLimiter,
    backoff: Backoff,
}

impl ListenBrainzClient {
    pub fn new(token: Option<String>, requests_per_second: u32) -> Self {
        ListenBrainzClient {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build HTTP client"),
            token: std::sync::RwLock::new(token),
            limiter: RateLimiter::per_second(requests_per_second),
            backoff: Backoff::default(),
        }
    }

    pub fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("lock poisoned") = token;
    }

    pub async fn listen_count_for_recording(
        &self,
        recording_mbid: &str,
    ) -> Result<ListenBrainzListenCount, ProviderError> {
        let url = format!(
            "https://api.listenbrainz.org/1/stats/recording/{recording_mbid}/listeners"
        );
        let token = self.token.read().expect("lock poisoned").clone();
        let resp = execute_with_retry(
            ProviderName::ListenBrainz,
            &url,
            &self.limiter,
            &self.backoff,
            || {
                let mut req = self.http.get(&url);
                if let Some(t) = &token {
                    req = req.header("Authorization", format!("Token {t}"));
                }
                req
            },
        )
        .await?;

        let parsed: RecordingStatsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        Ok(ListenBrainzListenCount {
            listen_count: parsed.payload.total_listen_count,
        })
    }
}

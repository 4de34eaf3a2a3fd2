//! Rate-limited provider HTTP clients (C1, §4.1).

pub mod discogs;
pub mod lastfm;
pub mod listenbrainz;
pub mod musicbrainz;
pub mod rate_limiter;
pub mod spotify;

use crate::error::ProviderError;
use rate_limiter::{Backoff, RateLimiter};
use reqwest::Response;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Provider name as it appears in logs, `single_sources`, and the
/// `signal_cache` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderName {
    Spotify,
    LastFm,
    ListenBrainz,
    MusicBrainz,
    Discogs,
}

impl ProviderName {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderName::Spotify => "spotify",
            ProviderName::LastFm => "lastfm",
            ProviderName::ListenBrainz => "listenbrainz",
            ProviderName::MusicBrainz => "musicbrainz",
            ProviderName::Discogs => "discogs",
        }
    }
}

/// Send `make_request` (a fresh request builder each attempt), honoring
/// the rate limiter, retry-on-transient, and the 429/Retry-After contract
/// from §4.1. Returns the parsed body, or a `ProviderError`.
///
/// `path` is the request path only (no query string, no credentials) —
/// logged at `debug` alongside the call's outcome and elapsed time.
pub async fn execute_with_retry<F>(
    provider: ProviderName,
    path: &str,
    limiter: &RateLimiter,
    backoff: &Backoff,
    make_request: F,
) -> Result<Response, ProviderError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let _span = tracing::debug_span!("provider_call", provider = provider.as_str(), path).entered();
    let start = Instant::now();
    let result = execute_with_retry_inner(provider, limiter, backoff, make_request).await;
    debug!(elapsed_ms = start.elapsed().as_millis() as u64, ok = result.is_ok(), "provider call finished");
    result
}

async fn execute_with_retry_inner<F>(
    provider: ProviderName,
    limiter: &RateLimiter,
    backoff: &Backoff,
    mut make_request: F,
) -> Result<Response, ProviderError>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt = 0u32;
    loop {
        limiter.acquire().await;

        let result = make_request().send().await;
        match result {
            Ok(resp) if resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| backoff.delay_for_attempt(attempt));

                warn!(provider = provider.as_str(), ?retry_after, "rate limited, suspending");
                limiter.suspend_until(retry_after).await;

                attempt += 1;
                if attempt >= backoff.max_attempts {
                    return Err(ProviderError::RateLimited);
                }
            }
            Ok(resp) if resp.status() == reqwest::StatusCode::UNAUTHORIZED => {
                return Err(ProviderError::Unauthorized);
            }
            Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => {
                return Err(ProviderError::NotFound);
            }
            Ok(resp) if resp.status().is_client_error() => {
                return Err(ProviderError::Unknown(format!(
                    "{} returned {}",
                    provider.as_str(),
                    resp.status()
                )));
            }
            Ok(resp) if resp.status().is_server_error() => {
                attempt += 1;
                if attempt >= backoff.max_attempts {
                    return Err(ProviderError::Network(format!(
                        "{} returned {}",
                        provider.as_str(),
                        resp.status()
                    )));
                }
                tokio::time::sleep(backoff.delay_for_attempt(attempt - 1)).await;
            }
            Ok(resp) => return Ok(resp),
            Err(e) if e.is_timeout() => {
                attempt += 1;
                if attempt >= backoff.max_attempts {
                    return Err(ProviderError::Timeout);
                }
                tokio::time::sleep(backoff.delay_for_attempt(attempt - 1)).await;
            }
            Err(e) => {
                attempt += 1;
                if attempt >= backoff.max_attempts {
                    return Err(ProviderError::Network(e.to_string()));
                }
                tokio::time::sleep(backoff.delay_for_attempt(attempt - 1)).await;
            }
        }
    }
}

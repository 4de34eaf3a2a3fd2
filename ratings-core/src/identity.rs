//! Identity resolution (C2, §4.2): turn (artist, album, title, ...)
//! into stable provider IDs, with negative-resolution caching so a
//! genuinely-missing entity isn't re-queried every run.

use crate::error::ProviderError;
use crate::normalize::{durations_match, normalize_text};
use crate::providers::discogs::DiscogsClient;
use crate::providers::musicbrainz::MusicBrainzClient;
use crate::providers::spotify::SpotifyClient;
use crate::signals::ProviderHealth;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// Default TTL for cached negative (not-found) resolutions (§4.2).
pub const NEGATIVE_CACHE_TTL_HOURS: i64 = 24;

/// Resolved provider identity for one track.
#[derive(Debug, Clone, Default)]
pub struct TrackIdentity {
    pub spotify_track_id: Option<String>,
    pub isrc: Option<String>,
    pub musicbrainz_recording_id: Option<String>,
    pub discogs_release_id: Option<u64>,
}

struct NegativeCache {
    entries: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl NegativeCache {
    fn new() -> Self {
        NegativeCache {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn is_fresh_miss(&self, key: &str, now: DateTime<Utc>) -> bool {
        let entries = self.entries.lock().expect("lock poisoned");
        match entries.get(key) {
            Some(expires_at) => *expires_at > now,
            None => false,
        }
    }

    fn record_miss(&self, key: &str, now: DateTime<Utc>) {
        let mut entries = self.entries.lock().expect("lock poisoned");
        entries.insert(key.to_string(), now + ChronoDuration::hours(NEGATIVE_CACHE_TTL_HOURS));
    }
}

pub struct IdentityResolver {
    spotify: Option<std::sync::Arc<SpotifyClient>>,
    musicbrainz: Option<std::sync::Arc<MusicBrainzClient>>,
    discogs: Option<std::sync::Arc<DiscogsClient>>,
    negative_cache: NegativeCache,
    health: Arc<ProviderHealth>,
}

impl IdentityResolver {
    pub fn new(
        spotify: Option<std::sync::Arc<SpotifyClient>>,
        musicbrainz: Option<std::sync::Arc<MusicBrainzClient>>,
        discogs: Option<std::sync::Arc<DiscogsClient>>,
        health: Arc<ProviderHealth>,
    ) -> Self {
        IdentityResolver {
            spotify,
            musicbrainz,
            discogs,
            negative_cache: NegativeCache::new(),
            health,
        }
    }

    /// Unauthorized is treated as a durable credential failure (§7):
    /// disable the provider for the rest of the run instead of
    /// retrying it on every subsequent lookup.
    fn note_auth_failure(&self, provider: &'static str) {
        self.health.disable(provider);
        let err = crate::error::PipelineError::Auth(provider);
        warn!(provider, %err, "disabling provider for remainder of run");
    }

    /// Step 1: one Spotify artist-ID lookup per artist, never per
    /// track (invariant 9).
    pub async fn resolve_artist_spotify_id(&self, artist_name: &str, now: DateTime<Utc>) -> Option<String> {
        let cache_key = format!("spotify_artist:{}", normalize_text(artist_name));
        if self.negative_cache.is_fresh_miss(&cache_key, now) {
            return None;
        }
        let Some(spotify) = &self.spotify else { return None };
        if self.health.is_disabled("spotify") {
            return None;
        }
        match spotify.search_artist(artist_name).await {
            Ok(Some(artist)) => Some(artist.id),
            Ok(None) => {
                self.negative_cache.record_miss(&cache_key, now);
                None
            }
            Err(ProviderError::Unauthorized) => {
                self.note_auth_failure("spotify");
                None
            }
            Err(e) => {
                warn!(provider = "spotify", kind = ?e, "artist identity lookup failed");
                None
            }
        }
    }

    /// Steps 2+4: Spotify track ID and ISRC, preferring exact
    /// normalized-title match, tie-broken on duration then popularity.
    pub async fn resolve_spotify_track(
        &self,
        artist: &str,
        title: &str,
        duration_seconds: Option<f64>,
        now: DateTime<Utc>,
    ) -> (Option<String>, Option<String>) {
        let cache_key = format!("spotify_track:{}:{}", normalize_text(artist), normalize_text(title));
        if self.negative_cache.is_fresh_miss(&cache_key, now) {
            return (None, None);
        }
        let Some(spotify) = &self.spotify else { return (None, None) };
        if self.health.is_disabled("spotify") {
            return (None, None);
        }

        let candidates = match spotify.search_track(artist, title).await {
            Ok(c) => c,
            Err(ProviderError::Unauthorized) => {
                self.note_auth_failure("spotify");
                return (None, None);
            }
            Err(e) => {
                warn!(provider = "spotify", kind = ?e, "track identity lookup failed");
                return (None, None);
            }
        };

        let normalized_title = normalize_text(title);
        let best = candidates
            .into_iter()
            .filter(|t| normalize_text(&t.name) == normalized_title)
            .max_by(|a, b| {
                let a_dur_ok = durations_match(duration_seconds, Some(a.duration_ms as f64 / 1000.0));
                let b_dur_ok = durations_match(duration_seconds, Some(b.duration_ms as f64 / 1000.0));
                a_dur_ok
                    .cmp(&b_dur_ok)
                    .then(a.popularity.cmp(&b.popularity))
            });

        match best {
            Some(track) => (Some(track.id), track.external_ids.isrc),
            None => {
                self.negative_cache.record_miss(&cache_key, now);
                (None, None)
            }
        }
    }

    /// Step 3: MusicBrainz recording ID, disambiguated by duration and
    /// release-group presence.
    pub async fn resolve_musicbrainz_recording_id(
        &self,
        artist: &str,
        title: &str,
        duration_seconds: Option<f64>,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let cache_key = format!("mb_recording:{}:{}", normalize_text(artist), normalize_text(title));
        if self.negative_cache.is_fresh_miss(&cache_key, now) {
            return None;
        }
        let Some(mb) = &self.musicbrainz else { return None };
        if self.health.is_disabled("musicbrainz") {
            return None;
        }

        let candidates = match mb.search_recording(artist, title).await {
            Ok(c) => c,
            Err(ProviderError::Unauthorized) => {
                self.note_auth_failure("musicbrainz");
                return None;
            }
            Err(e) => {
                warn!(provider = "musicbrainz", kind = ?e, "recording identity lookup failed");
                return None;
            }
        };

        let best = candidates.into_iter().max_by_key(|r| {
            let duration_ok = r
                .length
                .map(|ms| durations_match(duration_seconds, Some(ms as f64 / 1000.0)))
                .unwrap_or(false);
            let has_release_group = r.releases.iter().any(|rel| rel.release_group.is_some());
            (duration_ok, has_release_group)
        });

        match best {
            Some(r) => Some(r.id),
            None => {
                self.negative_cache.record_miss(&cache_key, now);
                None
            }
        }
    }

    /// Step 5: Discogs release ID, cached keyed by (normalized_artist,
    /// normalized_album).
    pub async fn resolve_discogs_release_id(
        &self,
        artist: &str,
        album: &str,
        now: DateTime<Utc>,
    ) -> Option<u64> {
        let cache_key = format!("discogs_release:{}:{}", normalize_text(artist), normalize_text(album));
        if self.negative_cache.is_fresh_miss(&cache_key, now) {
            return None;
        }
        let Some(discogs) = &self.discogs else { return None };
        if self.health.is_disabled("discogs") {
            return None;
        }

        match discogs.search_release(artist, album).await {
            Ok(Some(id)) => Some(id),
            Ok(None) => {
                self.negative_cache.record_miss(&cache_key, now);
                None
            }
            Err(ProviderError::Unauthorized) => {
                self.note_auth_failure("discogs");
                None
            }
            Err(e) => {
                warn!(provider = "discogs", kind = ?e, "release identity lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_cache_expires_after_ttl() {
        let cache = NegativeCache::new();
        let now = Utc::now();
        cache.record_miss("k", now);
        assert!(cache.is_fresh_miss("k", now));
        assert!(!cache.is_fresh_miss("k", now + ChronoDuration::hours(NEGATIVE_CACHE_TTL_HOURS + 1)));
    }

    #[tokio::test]
    async fn resolver_with_no_clients_returns_none() {
        let resolver = IdentityResolver::new(None, None, None, Arc::new(ProviderHealth::default()));
        let now = Utc::now();
        assert!(resolver.resolve_artist_spotify_id("A", now).await.is_none());
        assert!(resolver
            .resolve_musicbrainz_recording_id("A", "T", None, now)
            .await
            .is_none());
        assert!(resolver.resolve_discogs_release_id("A", "Alb", now).await.is_none());
    }
}

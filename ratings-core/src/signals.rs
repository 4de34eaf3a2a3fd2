//! Signal fetchers (C3, §4.3): the raw per-track and per-artist data
//! pulled from each provider, with partial-failure tolerance — a
//! missing fetcher result is `None`, never an aborted track. Results
//! are cached per source in `signal_cache` so a rescan inside
//! `freshness_days` doesn't re-hit providers for data already held.

use crate::db;
use crate::error::ProviderError;
use crate::normalize::normalize_text;
use crate::providers::discogs::{DiscogsClient, DiscogsRelease};
use crate::providers::lastfm::{LastFmClient, LastFmTrackInfo};
use crate::providers::listenbrainz::{ListenBrainzClient, ListenBrainzListenCount};
use crate::providers::musicbrainz::{MbRecording, MusicBrainzClient};
use crate::providers::spotify::{SpotifyAudioFeatures, SpotifyClient, SpotifyTrack};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use tracing::warn;

/// Providers disabled for the remainder of a run after an
/// `Unauthorized` response (§7). Once disabled, callers skip the
/// provider entirely rather than retrying a credential that has
/// already been rejected.
#[derive(Debug, Default)]
pub struct ProviderHealth {
    disabled: StdMutex<HashSet<&'static str>>,
}

impl ProviderHealth {
    pub fn is_disabled(&self, provider: &'static str) -> bool {
        self.disabled.lock().expect("lock poisoned").contains(provider)
    }

    pub(crate) fn disable(&self, provider: &'static str) {
        self.disabled.lock().expect("lock poisoned").insert(provider);
    }
}

/// Log the one-line-per-provider-error entry (§6) and discard the
/// error — a missing signal, not an aborted track (§4.3). An
/// `Unauthorized` response additionally disables the provider for the
/// rest of the run (§7): the credential is assumed bad, not transient.
fn log_and_discard<T>(health: &ProviderHealth, provider: &'static str, result: Result<T, ProviderError>) -> Option<T> {
    match result {
        Ok(v) => Some(v),
        Err(ProviderError::Unauthorized) => {
            health.disable(provider);
            let err = crate::error::PipelineError::Auth(provider);
            warn!(provider, %err, "disabling provider for remainder of run");
            None
        }
        Err(e) => {
            warn!(provider, kind = ?e, "provider signal fetch failed");
            None
        }
    }
}

/// Check the cache, and on a miss call `fetch` and cache a successful
/// result (§4.3). Cache misses or read errors are transparent to the
/// caller — both fall through to a live fetch.
async fn cached_fetch<T, Fut>(
    pool: &SqlitePool,
    cache_key: &str,
    now: DateTime<Utc>,
    freshness_days: i64,
    fetch: impl FnOnce() -> Fut,
) -> Option<T>
where
    T: Serialize + DeserializeOwned + Clone,
    Fut: Future<Output = Option<T>>,
{
    if let Ok(Some(cached)) = db::signal_cache::get::<T>(pool, cache_key, now).await {
        return Some(cached);
    }
    let result = fetch().await;
    if let Some(value) = &result {
        if let Err(e) = db::signal_cache::put(pool, cache_key, value, now, freshness_days).await {
            warn!(cache_key, "failed to write signal cache entry: {e}");
        }
    }
    result
}

/// The provider clients available for this run (a provider with
/// `enabled = false`, per config, is simply `None` here — the fetcher
/// treats it exactly like a transient failure: signal missing,
/// downstream renormalizes).
#[derive(Clone)]
pub struct ProviderClients {
    pub spotify: Option<Arc<SpotifyClient>>,
    pub lastfm: Option<Arc<LastFmClient>>,
    pub listenbrainz: Option<Arc<ListenBrainzClient>>,
    pub musicbrainz: Option<Arc<MusicBrainzClient>>,
    pub discogs: Option<Arc<DiscogsClient>>,
    pub health: Arc<ProviderHealth>,
}

/// Raw signals gathered for one track (§4.3). Every field is optional
/// because any individual fetcher may fail or be disabled.
#[derive(Debug, Clone, Default)]
pub struct TrackSignals {
    pub spotify_popularity: Option<u32>,
    pub spotify_album_type: Option<String>,
    pub spotify_total_tracks: Option<u32>,
    pub spotify_release_date: Option<String>,

    pub spotify_tempo: Option<f64>,
    pub spotify_energy: Option<f64>,
    pub spotify_danceability: Option<f64>,
    pub spotify_valence: Option<f64>,
    pub spotify_acousticness: Option<f64>,
    pub spotify_instrumentalness: Option<f64>,
    pub spotify_liveness: Option<f64>,
    pub spotify_speechiness: Option<f64>,
    pub spotify_loudness: Option<f64>,
    pub spotify_key: Option<i32>,
    pub spotify_mode: Option<i32>,

    pub lastfm_listeners: Option<u64>,
    pub lastfm_playcount: Option<u64>,
    pub lastfm_top_tags: Vec<String>,

    pub listenbrainz_listen_count: Option<u64>,

    pub mb_release_group_primary_type: Option<String>,
    pub mb_release_group_secondary_types: Vec<String>,

    pub discogs_has_single_format: bool,
    pub discogs_has_official_video: bool,
    pub discogs_is_short_release: bool,
}

/// Raw signals gathered once per artist (§4.3): batched so they're
/// fetched only once regardless of track count.
#[derive(Debug, Clone, Default)]
pub struct ArtistSignals {
    pub spotify_genres: Vec<String>,
    pub spotify_artist_popularity: Option<u32>,
}

/// Fetch all per-track signals concurrently (§4.3, §5): each source
/// runs as an independent future so one slow/failing provider doesn't
/// block the others. `discogs_release_id` comes from C2's identity
/// resolution (step 5) — `None` skips the Discogs fetch entirely.
pub async fn fetch_track_signals(
    clients: &ProviderClients,
    pool: &SqlitePool,
    now: DateTime<Utc>,
    freshness_days: i64,
    artist: &str,
    title: &str,
    musicbrainz_recording_id: Option<&str>,
    discogs_release_id: Option<u64>,
) -> TrackSignals {
    let health = &clients.health;

    let spotify_fut = async {
        let spotify = clients.spotify.as_ref()?;
        if health.is_disabled("spotify") {
            return None;
        }
        let cache_key = format!("spotify_track:{}:{}", normalize_text(artist), normalize_text(title));
        cached_fetch::<(SpotifyTrack, Option<SpotifyAudioFeatures>), _>(pool, &cache_key, now, freshness_days, || async {
            let track = log_and_discard(health, "spotify", spotify.search_track(artist, title).await)?
                .into_iter()
                .next()?;
            let features = log_and_discard(health, "spotify", spotify.audio_features(&[track.id.clone()]).await)
                .and_then(|v| v.into_iter().next())
                .flatten();
            Some((track, features))
        })
        .await
    };

    let lastfm_fut = async {
        let lastfm = clients.lastfm.as_ref()?;
        if health.is_disabled("lastfm") {
            return None;
        }
        let cache_key = format!("lastfm_track:{}:{}", normalize_text(artist), normalize_text(title));
        cached_fetch::<LastFmTrackInfo, _>(pool, &cache_key, now, freshness_days, || async {
            log_and_discard(health, "lastfm", lastfm.track_info(artist, title).await)
        })
        .await
    };

    let listenbrainz_fut = async {
        let lb = clients.listenbrainz.as_ref()?;
        let mbid = musicbrainz_recording_id?;
        if health.is_disabled("listenbrainz") {
            return None;
        }
        let cache_key = format!("listenbrainz:{mbid}");
        cached_fetch::<ListenBrainzListenCount, _>(pool, &cache_key, now, freshness_days, || async {
            log_and_discard(health, "listenbrainz", lb.listen_count_for_recording(mbid).await)
        })
        .await
    };

    let mb_release_group_fut = async {
        let mb = clients.musicbrainz.as_ref()?;
        let mbid = musicbrainz_recording_id?;
        if health.is_disabled("musicbrainz") {
            return None;
        }
        let cache_key = format!("mb_recording:{mbid}");
        let recording = cached_fetch::<MbRecording, _>(pool, &cache_key, now, freshness_days, || async {
            log_and_discard(health, "musicbrainz", mb.lookup_recording(mbid).await)
        })
        .await?;
        recording.releases.into_iter().find_map(|r| r.release_group)
    };

    let discogs_fut = async {
        let discogs = clients.discogs.as_ref()?;
        let release_id = discogs_release_id?;
        if health.is_disabled("discogs") {
            return None;
        }
        let cache_key = format!("discogs_release:{release_id}");
        cached_fetch::<DiscogsRelease, _>(pool, &cache_key, now, freshness_days, || async {
            log_and_discard(health, "discogs", discogs.release(release_id).await)
        })
        .await
    };

    let (spotify, lastfm, listenbrainz, release_group, discogs_release) =
        tokio::join!(spotify_fut, lastfm_fut, listenbrainz_fut, mb_release_group_fut, discogs_fut);

    let (spotify_track, spotify_features) = match spotify {
        Some((t, f)) => (Some(t), f),
        None => (None, None),
    };
    let normalized_title = normalize_text(title);

    TrackSignals {
        spotify_popularity: spotify_track.as_ref().map(|t| t.popularity),
        spotify_album_type: spotify_track.as_ref().map(|t| t.album.album_type.clone()),
        spotify_total_tracks: spotify_track.as_ref().map(|t| t.album.total_tracks),
        spotify_release_date: spotify_track.as_ref().and_then(|t| t.album.release_date.clone()),

        spotify_tempo: spotify_features.as_ref().map(|f| f.tempo),
        spotify_energy: spotify_features.as_ref().map(|f| f.energy),
        spotify_danceability: spotify_features.as_ref().map(|f| f.danceability),
        spotify_valence: spotify_features.as_ref().map(|f| f.valence),
        spotify_acousticness: spotify_features.as_ref().map(|f| f.acousticness),
        spotify_instrumentalness: spotify_features.as_ref().map(|f| f.instrumentalness),
        spotify_liveness: spotify_features.as_ref().map(|f| f.liveness),
        spotify_speechiness: spotify_features.as_ref().map(|f| f.speechiness),
        spotify_loudness: spotify_features.as_ref().map(|f| f.loudness),
        spotify_key: spotify_features.as_ref().map(|f| f.key),
        spotify_mode: spotify_features.as_ref().map(|f| f.mode),

        lastfm_listeners: lastfm.as_ref().map(|l| l.listeners),
        lastfm_playcount: lastfm.as_ref().map(|l| l.playcount),
        lastfm_top_tags: lastfm.map(|l| l.top_tags).unwrap_or_default(),

        listenbrainz_listen_count: listenbrainz.map(|l| l.listen_count),

        mb_release_group_primary_type: release_group.as_ref().and_then(|rg| rg.primary_type.clone()),
        mb_release_group_secondary_types: release_group.map(|rg| rg.secondary_types).unwrap_or_default(),

        discogs_has_single_format: discogs_release.as_ref().map(DiscogsRelease::has_single_format).unwrap_or(false),
        discogs_has_official_video: discogs_release
            .as_ref()
            .map(|r| r.has_official_video_for(&normalized_title))
            .unwrap_or(false),
        discogs_is_short_release: discogs_release.as_ref().map(DiscogsRelease::is_short_release).unwrap_or(false),
    }
}

pub async fn fetch_artist_signals(clients: &ProviderClients, artist_name: &str) -> ArtistSignals {
    let Some(spotify) = &clients.spotify else {
        return ArtistSignals::default();
    };
    if clients.health.is_disabled("spotify") {
        return ArtistSignals::default();
    }
    match log_and_discard(&clients.health, "spotify", spotify.search_artist(artist_name).await) {
        Some(Some(artist)) => ArtistSignals {
            spotify_genres: artist.genres,
            spotify_artist_popularity: Some(artist.popularity),
        },
        _ => ArtistSignals::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_clients() -> ProviderClients {
        ProviderClients {
            spotify: None,
            lastfm: None,
            listenbrainz: None,
            musicbrainz: None,
            discogs: None,
            health: Arc::new(ProviderHealth::default()),
        }
    }

    #[tokio::test]
    async fn fetch_track_signals_with_no_clients_is_all_missing() {
        let clients = empty_clients();
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::db::schema::init_schema(&pool).await.unwrap();
        let signals = fetch_track_signals(&clients, &pool, Utc::now(), 7, "Artist", "Title", None, None).await;
        assert!(signals.spotify_popularity.is_none());
        assert!(signals.lastfm_listeners.is_none());
        assert!(signals.listenbrainz_listen_count.is_none());
        assert!(!signals.discogs_has_single_format);
    }

    #[test]
    fn disabled_provider_is_reported_disabled() {
        let health = ProviderHealth::default();
        assert!(!health.is_disabled("spotify"));
        let result: Result<u32, ProviderError> = Err(ProviderError::Unauthorized);
        assert!(log_and_discard(&health, "spotify", result).is_none());
        assert!(health.is_disabled("spotify"));
    }
}

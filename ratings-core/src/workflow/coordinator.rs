//! The outer artist/album loop (C9, §4.9): resume filtering, strictly
//! sequential album processing, cancellation, per-album timeout, and
//! the consecutive-fatal-error circuit breaker (§5).

use crate::banding::{band_album, BandingInput};
use crate::config::Config;
use crate::db;
use crate::identity::IdentityResolver;
use crate::model::{AlbumCtx, AlbumType, Artist, ScanHistoryEntry, ScanOutcome, Track};
use crate::musicserver::{AlbumRef, MusicServerClient, TrackRef};
use crate::normalize::{normalize_text, AlternateVersionMatcher};
use crate::popularity::{fuse_popularity, normalize_signals, AdaptiveCeilings, PopularityCandidate};
use crate::progress::ProgressReporter;
use crate::signals::{fetch_track_signals, ProviderClients};
use crate::singles::{detect_single, SingleDetectionInput};
use chrono::Utc;
use ratings_common::Result as CommonResult;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// An album's position within the current run, carried through only to
/// label the one-line-per-album log (§6).
#[derive(Debug, Clone, Copy)]
struct AlbumPosition {
    artist_idx: usize,
    total_artists: usize,
    album_idx: usize,
    total_albums: usize,
}

pub struct Coordinator<M: MusicServerClient + 'static> {
    music_server: Arc<M>,
    pool: SqlitePool,
    config: Config,
    clients: ProviderClients,
    resolver: Arc<IdentityResolver>,
    matcher: Arc<AlternateVersionMatcher>,
    progress: Arc<ProgressReporter>,
    ceilings: Arc<std::sync::Mutex<AdaptiveCeilings>>,
    cancel: CancellationToken,
}

impl<M: MusicServerClient + 'static> Coordinator<M> {
    pub fn new(
        music_server: Arc<M>,
        pool: SqlitePool,
        config: Config,
        clients: ProviderClients,
        resolver: Arc<IdentityResolver>,
        progress: Arc<ProgressReporter>,
        cancel: CancellationToken,
    ) -> Self {
        let matcher = AlternateVersionMatcher::new(&config.normalization.alternate_version_patterns);
        Coordinator {
            music_server,
            pool,
            config,
            clients,
            resolver,
            matcher: Arc::new(matcher),
            progress,
            ceilings: Arc::new(std::sync::Mutex::new(AdaptiveCeilings::default())),
            cancel,
        }
    }

    /// Run one full pass over every artist/album the music server
    /// reports (§4.9). Returns once the catalog has been swept or
    /// cancellation/the fatal-error threshold stops it early.
    ///
    /// Across albums the loop is strictly sequential (§5): the next
    /// album begins only after the current album's persistence
    /// commits. API rate limits dominate cost, so the only
    /// parallelism in this pipeline is across providers within a
    /// single album's fetch phase (`tokio::join!` in `signals.rs`).
    pub async fn run_once(&self) -> Result<(), crate::error::PipelineError> {
        let artists = self
            .music_server
            .list_artists()
            .await
            .map_err(|e| crate::error::PipelineError::FatalInternal(e.to_string()))?;

        self.progress.update(Utc::now(), |s| {
            s.is_running = true;
            s.total_artists = artists.len() as u64;
            s.current_phase = "popularity".to_string();
        })?;

        let mut consecutive_fatal: u32 = 0;
        let total_artists = artists.len();

        for (artist_idx, artist_ref) in artists.into_iter().enumerate() {
            if self.cancel.is_cancelled() {
                return Err(crate::error::PipelineError::Cancelled);
            }

            let spotify_artist_id = self
                .resolver
                .resolve_artist_spotify_id(&artist_ref.name, Utc::now())
                .await;

            let artist = Artist {
                id: artist_ref.id.clone(),
                name: artist_ref.name.clone(),
                musicbrainz_artist_id: None,
                spotify_artist_id: spotify_artist_id.clone(),
                discogs_artist_id: None,
                last_scanned_at: Some(Utc::now()),
            };
            db::artists::upsert_artist(&self.pool, &artist).await?;

            // §4.2 step 1: the lookup happens once per artist, but
            // every one of that artist's existing track rows needs it.
            if let Some(spotify_artist_id) = &spotify_artist_id {
                if let Err(e) =
                    db::tracks::set_artist_spotify_id(&self.pool, &artist.id, spotify_artist_id).await
                {
                    warn!("failed to batch-write spotify_artist_id for artist {}: {e}", artist.name);
                }
            }

            let albums = match self.music_server.list_albums(&artist_ref.id).await {
                Ok(a) => a,
                Err(e) => {
                    warn!("failed to list albums for artist {}: {e}", artist_ref.name);
                    continue;
                }
            };

            self.progress.update(Utc::now(), |s| {
                s.current_artist = Some(artist_ref.name.clone());
            })?;

            let total_albums = albums.len();

            for (album_idx, album_ref) in albums.into_iter().enumerate() {
                if self.cancel.is_cancelled() {
                    break;
                }
                if consecutive_fatal >= self.config.consecutive_fatal_threshold {
                    error!("consecutive fatal error threshold reached, stopping run");
                    return Err(crate::error::PipelineError::FatalInternal(
                        "consecutive fatal error threshold reached".to_string(),
                    ));
                }

                let position = AlbumPosition {
                    artist_idx: artist_idx + 1,
                    total_artists,
                    album_idx: album_idx + 1,
                    total_albums,
                };

                let attempt_start = Utc::now();
                let timeout = std::time::Duration::from_secs(self.config.album_timeout_seconds);
                let outcome = tokio::time::timeout(
                    timeout,
                    self.process_album(&artist, &album_ref, &self.cancel, position),
                )
                .await;

                match outcome {
                    Ok(Ok(())) => {
                        consecutive_fatal = 0;
                    }
                    Ok(Err(crate::error::PipelineError::Cancelled)) => {
                        warn!("album {} cancelled before commit", album_ref.title);
                    }
                    Ok(Err(e)) => {
                        warn!("album {} failed: {e}", album_ref.title);
                        self.record_failed_scan(&album_ref.id, attempt_start, ScanOutcome::Failed, &e.to_string())
                            .await;
                        consecutive_fatal += 1;
                    }
                    Err(_) => {
                        warn!("album {} timed out after {:?}", album_ref.title, timeout);
                        self.record_failed_scan(
                            &album_ref.id,
                            attempt_start,
                            ScanOutcome::Partial,
                            &format!("album timed out after {:?}", timeout),
                        )
                        .await;
                        consecutive_fatal += 1;
                    }
                }
            }

            self.progress.update(Utc::now(), |s| {
                s.processed_artists += 1;
            })?;
        }

        self.progress.update(Utc::now(), |s| {
            s.is_running = false;
            s.current_phase = "done".to_string();
        })?;

        Ok(())
    }

    /// Resume filter + full C2-C8 pipeline for one album (§4.9).
    async fn process_album(
        &self,
        artist: &Artist,
        album_ref: &AlbumRef,
        cancel: &CancellationToken,
        position: AlbumPosition,
    ) -> Result<(), crate::error::PipelineError> {
        if cancel.is_cancelled() {
            return Err(crate::error::PipelineError::Cancelled);
        }

        if !self.config.features.force {
            if let Some((ScanOutcome::Ok, started_at)) =
                db::scan_history::last_outcome_for_album(&self.pool, &album_ref.id).await?
            {
                let freshness = chrono::Duration::days(self.config.freshness_days);
                if Utc::now() - started_at < freshness {
                    return Ok(());
                }
            }
        }

        let started_at = Utc::now();
        self.progress.update(started_at, |s| {
            s.current_album = Some(album_ref.title.clone());
            s.current_phase = "popularity".to_string();
        })?;

        let track_refs = self
            .music_server
            .list_tracks(&album_ref.id)
            .await
            .map_err(|e| crate::error::PipelineError::FatalInternal(e.to_string()))?;

        let album_type = match album_ref.album_type.as_deref() {
            Some("single") => AlbumType::Single,
            Some("compilation") => AlbumType::Compilation,
            Some("ep") => AlbumType::Ep,
            Some("album") => AlbumType::Album,
            _ => AlbumType::Unknown,
        };
        let album_ctx = AlbumCtx {
            album_type: album_type.clone(),
            is_compilation: album_type == AlbumType::Compilation,
            is_live: normalize_text(&album_ref.title).contains("live"),
            is_unplugged: normalize_text(&album_ref.title).contains("unplugged"),
        };

        let album = crate::model::Album {
            id: album_ref.id.clone(),
            artist_id: artist.id.clone(),
            title: album_ref.title.clone(),
            normalized_title: normalize_text(&album_ref.title),
            album_type,
            release_year: album_ref.year,
            total_tracks: album_ref.track_count,
            is_compilation: album_ctx.is_compilation,
            is_live: album_ctx.is_live,
            is_unplugged: album_ctx.is_unplugged,
            cover_art_url: album_ref.cover_url.clone(),
        };

        // §4.2 step 5: resolved once per album, not per track — every
        // track on this release shares the same Discogs release ID.
        let discogs_release_id = self
            .resolver
            .resolve_discogs_release_id(&artist.name, &album.title, started_at)
            .await;

        let mut tracks: Vec<Track> = Vec::with_capacity(track_refs.len());
        let mut banding_inputs: Vec<BandingInput> = Vec::with_capacity(track_refs.len());
        let mut track_signals: Vec<crate::signals::TrackSignals> = Vec::with_capacity(track_refs.len());
        let current_year = started_at.format("%Y").to_string().parse::<i32>().unwrap_or(2024);

        for track_ref in &track_refs {
            if cancel.is_cancelled() {
                return Err(crate::error::PipelineError::Cancelled);
            }

            let identity = self
                .resolve_track_identity(artist, discogs_release_id, track_ref)
                .await;

            let signals = fetch_track_signals(
                &self.clients,
                &self.pool,
                started_at,
                self.config.freshness_days,
                &artist.name,
                &track_ref.title,
                identity.musicbrainz_recording_id.as_deref(),
                discogs_release_id,
            )
            .await;

            if let Some(playcount) = signals.lastfm_playcount {
                self.ceilings.lock().expect("ceilings lock poisoned").observe_lastfm(playcount);
            }
            if let Some(count) = signals.listenbrainz_listen_count {
                self.ceilings
                    .lock()
                    .expect("ceilings lock poisoned")
                    .observe_listenbrainz(count);
            }

            let normalized = {
                let ceilings = self.ceilings.lock().expect("ceilings lock poisoned");
                normalize_signals(&signals, album.release_year, current_year, &ceilings)
            };
            let local_popularity = fuse_popularity(normalized, &self.config.effective_weights());

            let candidate = PopularityCandidate {
                title: track_ref.title.clone(),
                isrc: identity.isrc.clone(),
                duration_seconds: track_ref.duration,
                popularity_score: local_popularity,
            };
            let siblings = db::tracks::find_candidates_by_isrc_or_title(
                &self.pool,
                identity.isrc.as_deref(),
                &normalize_text(&track_ref.title),
            )
            .await?;
            let sibling_candidates: Vec<PopularityCandidate> = siblings
                .iter()
                .map(|t| PopularityCandidate {
                    title: t.title.clone(),
                    isrc: t.isrc.clone(),
                    duration_seconds: t.duration_seconds,
                    popularity_score: t.popularity_score,
                })
                .chain(std::iter::once(candidate.clone()))
                .collect();
            let global_popularity = crate::popularity::compute_global_popularity(
                &candidate,
                &sibling_candidates,
                &self.matcher,
            );

            let effective_popularity = if album_ctx.is_compilation {
                local_popularity
            } else {
                global_popularity
            };

            banding_inputs.push(BandingInput {
                track_id: track_ref.id.clone(),
                track_number: track_ref.track_no,
                title: track_ref.title.clone(),
                popularity: effective_popularity,
                is_single_high: false,
                is_single_medium: false,
            });

            tracks.push(Track {
                id: track_ref.id.clone(),
                artist_id: artist.id.clone(),
                album_id: album.id.clone(),
                title: track_ref.title.clone(),
                track_number: track_ref.track_no,
                disc_number: track_ref.disc_no,
                duration_seconds: track_ref.duration,
                isrc: identity.isrc,
                musicbrainz_recording_id: identity.musicbrainz_recording_id,
                spotify_track_id: identity.spotify_track_id,
                spotify_artist_id: artist.spotify_artist_id.clone(),
                spotify_album_type: signals.spotify_album_type.clone(),
                discogs_release_id: discogs_release_id.map(|id| id as i64),
                popularity_score: local_popularity,
                global_popularity,
                album_zscore: None,
                stars: None,
                is_single: false,
                single_confidence: None,
                single_sources: vec![],
                last_scanned_at: Some(started_at),
                metadata_last_updated: Some(started_at),
            });
            track_signals.push(signals);
        }

        self.progress.update(Utc::now(), |s| {
            s.current_phase = "singles".to_string();
        })?;

        for (idx, track_ref) in track_refs.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(crate::error::PipelineError::Cancelled);
            }
            let signals = &track_signals[idx];
            let detection = detect_single(
                &SingleDetectionInput {
                    title: &track_ref.title,
                    album_ctx: &album_ctx,
                    signals,
                    discogs_has_single_format: signals.discogs_has_single_format,
                    discogs_has_official_video: signals.discogs_has_official_video,
                    discogs_is_short_release: signals.discogs_is_short_release,
                    album_zscore: None,
                },
                &self.matcher,
                self.config.use_advanced_detection,
                self.config.zscore_threshold,
            );

            tracks[idx].is_single = detection.is_single;
            tracks[idx].single_confidence = Some(detection.confidence);
            tracks[idx].single_sources = detection.sources.clone();
            banding_inputs[idx].is_single_high =
                detection.is_single && detection.confidence == crate::model::SingleConfidence::High;
            banding_inputs[idx].is_single_medium =
                detection.is_single && detection.confidence == crate::model::SingleConfidence::Medium;
        }

        self.progress.update(Utc::now(), |s| {
            s.current_phase = "ratings".to_string();
        })?;

        let banded = band_album(
            &banding_inputs,
            self.config.cap_top4_pct,
            self.config.zscore_threshold,
            album_ctx.is_compilation,
        );

        let mut singles_detected = 0;
        for track in tracks.iter_mut() {
            if let Some(result) = banded.iter().find(|r| r.track_id == track.id) {
                track.stars = Some(result.stars);
                track.album_zscore = result.zscore;
            }
            if track.is_single {
                singles_detected += 1;
            }
        }

        // All writes for this album commit atomically (§4.7).
        let mut tx = self.pool.begin().await.map_err(ratings_common::Error::from)?;
        db::albums::upsert_album_tx(&mut tx, &album).await?;
        for track in &tracks {
            db::tracks::upsert_scanned_track_tx(&mut tx, track).await?;
        }
        db::scan_history::record_scan_tx(
            &mut tx,
            &ScanHistoryEntry {
                album_id: album.id.clone(),
                started_at,
                finished_at: Some(Utc::now()),
                outcome: ScanOutcome::Ok,
                tracks_scanned: tracks.len() as i32,
                singles_detected,
                error: None,
            },
        )
        .await?;
        tx.commit().await.map_err(ratings_common::Error::from)?;

        self.progress.update(Utc::now(), |s| {
            s.current_phase = "sync".to_string();
        })?;

        for track in &tracks {
            if let Some(stars) = track.stars {
                if let Err(e) = self
                    .music_server
                    .set_rating(&track.id, stars.clamp(0, 5) as u8)
                    .await
                {
                    warn!("failed to push rating for track {}: {e}", track.id);
                }
            }
        }

        self.progress.update(Utc::now(), |s| {
            s.processed_tracks += tracks.len() as u64;
            s.total_tracks += tracks.len() as u64;
            s.singles_detected += singles_detected as u64;
        })?;

        let mut stars_dist = [0u32; 5];
        for track in &tracks {
            if let Some(stars) = track.stars {
                if (1..=5).contains(&stars) {
                    stars_dist[(stars - 1) as usize] += 1;
                }
            }
        }
        info!(
            "[artist {}/{}][album {}/{}] phase=sync tracks={} singles={} stars-dist=1:{}/2:{}/3:{}/4:{}/5:{} outcome=ok",
            position.artist_idx,
            position.total_artists,
            position.album_idx,
            position.total_albums,
            tracks.len(),
            singles_detected,
            stars_dist[0],
            stars_dist[1],
            stars_dist[2],
            stars_dist[3],
            stars_dist[4],
        );
        Ok(())
    }

    /// Persist a `failed`/`partial` scan-history row in its own small
    /// transaction so a mid-album error never blocks on the full album
    /// write path (§7: PersistError/FatalInternal/timeout handling).
    /// Best-effort: a failure here is logged, not propagated, since the
    /// coordinator must advance regardless.
    async fn record_failed_scan(
        &self,
        album_id: &str,
        started_at: chrono::DateTime<Utc>,
        outcome: ScanOutcome,
        error: &str,
    ) {
        let entry = ScanHistoryEntry {
            album_id: album_id.to_string(),
            started_at,
            finished_at: Some(Utc::now()),
            outcome,
            tracks_scanned: 0,
            singles_detected: 0,
            error: Some(error.to_string()),
        };
        if let Err(e) = db::scan_history::record_scan(&self.pool, &entry).await {
            warn!("failed to record scan-history row for album {album_id}: {e}");
        }
    }

    async fn resolve_track_identity(
        &self,
        artist: &Artist,
        discogs_release_id: Option<u64>,
        track_ref: &TrackRef,
    ) -> crate::identity::TrackIdentity {
        let now = Utc::now();
        let (spotify_track_id, isrc) = self
            .resolver
            .resolve_spotify_track(&artist.name, &track_ref.title, track_ref.duration, now)
            .await;
        let musicbrainz_recording_id = self
            .resolver
            .resolve_musicbrainz_recording_id(&artist.name, &track_ref.title, track_ref.duration, now)
            .await;

        crate::identity::TrackIdentity {
            spotify_track_id,
            isrc,
            musicbrainz_recording_id,
            discogs_release_id,
        }
    }
}

/// Ensure the schema exists before the coordinator runs (§4.7).
pub async fn prepare_database(pool: &SqlitePool) -> CommonResult<()> {
    db::init_schema(pool).await
}

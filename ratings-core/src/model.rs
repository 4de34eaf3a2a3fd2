//! Persistent and transient record types (§3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlbumType {
    Album,
    Single,
    Compilation,
    Ep,
    Unknown,
}

impl Default for AlbumType {
    fn default() -> Self {
        AlbumType::Unknown
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SingleConfidence {
    Low,
    Medium,
    High,
}

impl SingleConfidence {
    pub fn as_str(self) -> &'static str {
        match self {
            SingleConfidence::Low => "low",
            SingleConfidence::Medium => "medium",
            SingleConfidence::High => "high",
        }
    }
}

impl std::str::FromStr for SingleConfidence {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(SingleConfidence::Low),
            "medium" => Ok(SingleConfidence::Medium),
            "high" => Ok(SingleConfidence::High),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanOutcome {
    Ok,
    Partial,
    Failed,
    Skipped,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::Ok => "ok",
            ScanOutcome::Partial => "partial",
            ScanOutcome::Failed => "failed",
            ScanOutcome::Skipped => "skipped",
        }
    }
}

/// An artist as known to the music server, enriched with provider IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    pub musicbrainz_artist_id: Option<String>,
    pub spotify_artist_id: Option<String>,
    pub discogs_artist_id: Option<String>,
    pub last_scanned_at: Option<DateTime<Utc>>,
}

/// An album owned by one artist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub id: String,
    pub artist_id: String,
    pub title: String,
    pub normalized_title: String,
    pub album_type: AlbumType,
    pub release_year: Option<i32>,
    pub total_tracks: i32,
    pub is_compilation: bool,
    pub is_live: bool,
    pub is_unplugged: bool,
    pub cover_art_url: Option<String>,
}

/// One track, with the fields the pipeline derives left `None`/default
/// until this album has been scanned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub artist_id: String,
    pub album_id: String,
    pub title: String,
    pub track_number: i32,
    pub disc_number: i32,
    pub duration_seconds: Option<f64>,
    pub isrc: Option<String>,
    pub musicbrainz_recording_id: Option<String>,
    pub spotify_track_id: Option<String>,
    pub spotify_artist_id: Option<String>,
    pub spotify_album_type: Option<String>,
    pub discogs_release_id: Option<i64>,
    pub popularity_score: Option<f64>,
    pub global_popularity: Option<f64>,
    pub album_zscore: Option<f64>,
    pub stars: Option<i32>,
    pub is_single: bool,
    pub single_confidence: Option<SingleConfidence>,
    pub single_sources: Vec<String>,
    pub last_scanned_at: Option<DateTime<Utc>>,
    pub metadata_last_updated: Option<DateTime<Utc>>,
}

/// Album-level context that shapes both banding (C5) and single
/// detection (C6): whether this is a compilation, a live/unplugged
/// release, and its nominal MusicBrainz release-group type.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlbumCtx {
    pub album_type: AlbumType,
    pub is_compilation: bool,
    pub is_live: bool,
    pub is_unplugged: bool,
}

/// The in-memory unit of work for one album (§3). Never persisted in
/// this shape; the coordinator builds one, drives it through C3-C7,
/// then drops it.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub artist: Artist,
    pub album: Album,
    pub tracks: Vec<Track>,
    pub album_ctx: AlbumCtx,
}

/// One append-only row in `scan_history`.
#[derive(Debug, Clone)]
pub struct ScanHistoryEntry {
    pub album_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcome: ScanOutcome,
    pub tracks_scanned: i32,
    pub singles_detected: i32,
    pub error: Option<String>,
}

//! Progress reporter (C8, §4.8): an atomically-written JSON snapshot
//! any external observer can poll without racing the coordinator.

use chrono::{DateTime, Utc};
use ratings_common::atomic_file::write_json_atomic;
use ratings_common::Result;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Serialize)]
pub struct ProgressSnapshot {
    pub is_running: bool,
    pub scan_type: String,
    pub current_artist: Option<String>,
    pub current_album: Option<String>,
    pub current_phase: String,
    pub processed_artists: u64,
    pub total_artists: u64,
    pub processed_tracks: u64,
    pub total_tracks: u64,
    pub singles_detected: u64,
    pub elapsed_seconds: i64,
    pub percent_complete: f64,
    pub started_at: DateTime<Utc>,
    pub last_update_at: DateTime<Utc>,
}

impl ProgressSnapshot {
    pub fn new(started_at: DateTime<Utc>, scan_type: &str) -> Self {
        ProgressSnapshot {
            is_running: true,
            scan_type: scan_type.to_string(),
            current_artist: None,
            current_album: None,
            current_phase: "starting".to_string(),
            processed_artists: 0,
            total_artists: 0,
            processed_tracks: 0,
            total_tracks: 0,
            singles_detected: 0,
            elapsed_seconds: 0,
            percent_complete: 0.0,
            started_at,
            last_update_at: started_at,
        }
    }
}

/// Serializes writes to the snapshot file so two overlapping writers
/// (unlikely in this single-coordinator design, but cheap to make
/// safe) never interleave their temp-file renames.
pub struct ProgressReporter {
    path: PathBuf,
    state: Mutex<ProgressSnapshot>,
}

impl ProgressReporter {
    pub fn new(path: impl Into<PathBuf>, started_at: DateTime<Utc>, scan_type: &str) -> Self {
        ProgressReporter {
            path: path.into(),
            state: Mutex::new(ProgressSnapshot::new(started_at, scan_type)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `update` to the in-memory snapshot, stamp `last_update_at`
    /// and the derived `elapsed_seconds`/`percent_complete` fields, then
    /// flush atomically (§4.8).
    pub fn update(&self, now: DateTime<Utc>, update: impl FnOnce(&mut ProgressSnapshot)) -> Result<()> {
        let mut snapshot = self.state.lock().expect("progress lock poisoned");
        update(&mut snapshot);
        snapshot.last_update_at = now;
        snapshot.elapsed_seconds = (now - snapshot.started_at).num_seconds().max(0);
        snapshot.percent_complete = if snapshot.total_tracks > 0 {
            100.0 * snapshot.processed_tracks as f64 / snapshot.total_tracks as f64
        } else {
            0.0
        };
        write_json_atomic(&self.path, &*snapshot)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.state.lock().expect("progress lock poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn update_writes_file_and_stamps_derived_fields() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("progress.json");
        let t0 = Utc::now();
        let reporter = ProgressReporter::new(&path, t0, "incremental");

        let t1 = t0 + chrono::Duration::seconds(5);
        reporter
            .update(t1, |s| {
                s.total_tracks = 4;
                s.processed_tracks = 1;
                s.current_album = Some("Album One".to_string());
            })
            .unwrap();

        let on_disk: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk["processed_tracks"], 1);
        assert_eq!(on_disk["current_album"], "Album One");
        assert_eq!(on_disk["elapsed_seconds"], 5);

        let snapshot = reporter.snapshot();
        assert_eq!(snapshot.last_update_at, t1);
        assert_eq!(snapshot.percent_complete, 25.0);
    }
}

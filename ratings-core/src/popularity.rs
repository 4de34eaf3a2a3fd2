//! Popularity fuser (C4, §4.4).

use crate::config::Weights;
use crate::normalize::{durations_match, normalize_text, AlternateVersionMatcher};
use crate::signals::TrackSignals;

/// One normalized source value in [0,100], or `None` if that source
/// was unavailable for this track.
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizedSignals {
    pub spotify: Option<f64>,
    pub lastfm: Option<f64>,
    pub listenbrainz: Option<f64>,
    pub age: Option<f64>,
}

/// Adaptive ceilings used by the Last.fm/ListenBrainz log-normalization
/// (§4.4): initialized at 1e7, raised as the scan observes larger
/// counts.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveCeilings {
    pub lastfm_max_seen: f64,
    pub listenbrainz_max_seen: f64,
}

impl Default for AdaptiveCeilings {
    fn default() -> Self {
        AdaptiveCeilings {
            lastfm_max_seen: 1e7,
            listenbrainz_max_seen: 1e7,
        }
    }
}

impl AdaptiveCeilings {
    pub fn observe_lastfm(&mut self, playcount: u64) {
        self.lastfm_max_seen = self.lastfm_max_seen.max(playcount as f64);
    }

    pub fn observe_listenbrainz(&mut self, listen_count: u64) {
        self.listenbrainz_max_seen = self.listenbrainz_max_seen.max(listen_count as f64);
    }
}

/// `100 * max(0, 1 - years_since_release / 50)` (§4.4).
pub fn age_factor(release_year: Option<i32>, current_year: i32) -> Option<f64> {
    let release_year = release_year?;
    let years_since = (current_year - release_year).max(0) as f64;
    Some(100.0 * (1.0 - years_since / 50.0).max(0.0))
}

pub fn normalize_signals(
    signals: &TrackSignals,
    release_year: Option<i32>,
    current_year: i32,
    ceilings: &AdaptiveCeilings,
) -> NormalizedSignals {
    NormalizedSignals {
        spotify: signals.spotify_popularity.map(|p| p as f64),
        lastfm: signals
            .lastfm_playcount
            .map(|p| crate::providers::lastfm::log_normalize(p, ceilings.lastfm_max_seen)),
        listenbrainz: signals
            .listenbrainz_listen_count
            .map(|c| crate::providers::lastfm::log_normalize(c, ceilings.listenbrainz_max_seen)),
        age: age_factor(release_year, current_year),
    }
}

/// Weighted sum of whichever sources are present, with the remaining
/// weights renormalized to sum to 1 (§4.4). `None` if every source is
/// missing.
pub fn fuse_popularity(signals: NormalizedSignals, weights: &Weights) -> Option<f64> {
    let present: Vec<(f64, f64)> = [
        (weights.spotify, signals.spotify),
        (weights.lastfm, signals.lastfm),
        (weights.listenbrainz, signals.listenbrainz),
        (weights.age, signals.age),
    ]
    .into_iter()
    .filter_map(|(w, v)| v.map(|v| (w, v)))
    .collect();

    if present.is_empty() {
        return None;
    }

    let weight_sum: f64 = present.iter().map(|(w, _)| w).sum();
    if weight_sum <= 0.0 {
        // All present sources carry zero weight (e.g. only ListenBrainz
        // available under the primary default profile) — fall back to
        // an unweighted average rather than producing NULL.
        let avg = present.iter().map(|(_, v)| v).sum::<f64>() / present.len() as f64;
        return Some(avg);
    }

    let weighted: f64 = present.iter().map(|(w, v)| w / weight_sum * v).sum();
    Some(weighted)
}

/// A track as seen by the global-popularity search: enough identity to
/// match alternate versions of the same recording (§4.4).
#[derive(Debug, Clone)]
pub struct PopularityCandidate {
    pub title: String,
    pub isrc: Option<String>,
    pub duration_seconds: Option<f64>,
    pub popularity_score: Option<f64>,
}

fn is_same_recording(a: &PopularityCandidate, b: &PopularityCandidate) -> bool {
    match (&a.isrc, &b.isrc) {
        (Some(x), Some(y)) if !x.is_empty() && !y.is_empty() => return x == y,
        _ => {}
    }
    normalize_text(&a.title) == normalize_text(&b.title)
        && durations_match(a.duration_seconds, b.duration_seconds)
}

/// `global_popularity` for `target`: the max `popularity_score` across
/// all matched non-alternate versions of the same recording in
/// `candidates` (which should include `target` itself). Falls back to
/// `target`'s own score if no canonical match is found (e.g. `target`
/// is itself the only — possibly alternate — version known).
pub fn compute_global_popularity(
    target: &PopularityCandidate,
    candidates: &[PopularityCandidate],
    matcher: &AlternateVersionMatcher,
) -> Option<f64> {
    let canonical_matches: Vec<f64> = candidates
        .iter()
        .filter(|c| is_same_recording(target, c))
        .filter(|c| !matcher.is_alternate_version(&c.title))
        .filter_map(|c| c.popularity_score)
        .collect();

    canonical_matches
        .into_iter()
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
        .or(target.popularity_score)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_factor_decays_linearly_and_floors_at_zero() {
        assert_eq!(age_factor(Some(2024), 2024), Some(100.0));
        assert_eq!(age_factor(Some(1974), 2024), Some(0.0));
        assert_eq!(age_factor(Some(1900), 2024), Some(0.0));
        assert_eq!(age_factor(None, 2024), None);
    }

    #[test]
    fn fuse_popularity_renormalizes_when_source_missing() {
        let weights = Weights {
            spotify: 0.3,
            lastfm: 0.5,
            listenbrainz: 0.0,
            age: 0.2,
            profile: None,
        };
        // Only spotify and age present; lastfm missing.
        let signals = NormalizedSignals {
            spotify: Some(80.0),
            lastfm: None,
            listenbrainz: None,
            age: Some(100.0),
        };
        let score = fuse_popularity(signals, &weights).unwrap();
        // renormalized: spotify 0.3/0.5=0.6, age 0.2/0.5=0.4
        let expected = 0.6 * 80.0 + 0.4 * 100.0;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn fuse_popularity_all_missing_is_none() {
        let weights = Weights::default();
        let signals = NormalizedSignals::default();
        assert!(fuse_popularity(signals, &weights).is_none());
    }

    #[test]
    fn global_popularity_excludes_alternate_versions_from_max() {
        let matcher = AlternateVersionMatcher::new(&crate::config::default_alternate_version_patterns());
        let target = PopularityCandidate {
            title: "Song".to_string(),
            isrc: Some("ISRC1".to_string()),
            duration_seconds: Some(200.0),
            popularity_score: Some(40.0),
        };
        let remix = PopularityCandidate {
            title: "Song (Remix)".to_string(),
            isrc: Some("ISRC1".to_string()),
            duration_seconds: Some(210.0),
            popularity_score: Some(95.0),
        };
        let candidates = vec![target.clone(), remix];
        let result = compute_global_popularity(&target, &candidates, &matcher);
        assert_eq!(result, Some(40.0));
    }
}

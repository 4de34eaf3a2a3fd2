//! The pipeline's configuration record (§6) and its defaults,
//! including the open-question resolutions recorded in §9.

use ratings_common::config::load_toml;
use ratings_common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Weights {
    pub spotify: f64,
    pub lastfm: f64,
    pub listenbrainz: f64,
    pub age: f64,
    /// `"alt"` selects [`Weights::alt_profile`] in place of the numeric
    /// fields above, applied once at load time (§9).
    pub profile: Option<String>,
}

impl Default for Weights {
    fn default() -> Self {
        // Primary default vector (§9): Spotify 0.30 / Last.fm 0.50 / LB 0.0 / Age 0.20.
        Weights {
            spotify: 0.30,
            lastfm: 0.50,
            listenbrainz: 0.0,
            age: 0.20,
            profile: None,
        }
    }
}

impl Weights {
    /// The documented alternate profile (`weights.profile = "alt"`).
    pub fn alt_profile() -> Self {
        Weights {
            spotify: 0.4,
            lastfm: 0.3,
            listenbrainz: 0.2,
            age: 0.1,
            profile: Some("alt".to_string()),
        }
    }

    pub fn sum(&self) -> f64 {
        self.spotify + self.lastfm + self.listenbrainz + self.age
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Features {
    pub force: bool,
    pub perpetual: bool,
    pub batchrate: bool,
}

impl Default for Features {
    fn default() -> Self {
        Features {
            force: false,
            perpetual: false,
            batchrate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub spotify_per_min: u32,
    pub lastfm_per_sec: u32,
    pub musicbrainz_per_sec: u32,
    pub listenbrainz_per_sec: u32,
    pub discogs_per_min: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        RateLimits {
            spotify_per_min: 180,
            lastfm_per_sec: 5,
            musicbrainz_per_sec: 1,
            listenbrainz_per_sec: 10,
            discogs_per_min: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub enabled: bool,
    pub credentials: Vec<String>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            enabled: true,
            credentials: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Providers {
    pub spotify: ProviderConfig,
    pub lastfm: ProviderConfig,
    pub listenbrainz: ProviderConfig,
    pub musicbrainz: ProviderConfig,
    pub discogs: ProviderConfig,
}

impl Default for Providers {
    fn default() -> Self {
        Providers {
            spotify: ProviderConfig::default(),
            lastfm: ProviderConfig::default(),
            listenbrainz: ProviderConfig::default(),
            musicbrainz: ProviderConfig::default(),
            discogs: ProviderConfig::default(),
        }
    }
}

/// Case-insensitive suffix patterns identifying an "alternate version"
/// of a recording (§4.4, §9).
pub fn default_alternate_version_patterns() -> Vec<String> {
    [
        "remix",
        "acoustic",
        "live",
        "karaoke",
        "instrumental",
        "edit",
        "club mix",
        "demo",
        "cover",
        "re-recorded",
        "unplugged",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Normalization {
    pub alternate_version_patterns: Vec<String>,
}

impl Default for Normalization {
    fn default() -> Self {
        Normalization {
            alternate_version_patterns: default_alternate_version_patterns(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub weights: Weights,
    pub features: Features,
    pub cap_top4_pct: f64,
    pub zscore_threshold: f64,
    pub use_advanced_detection: bool,
    pub rate_limits: RateLimits,
    pub freshness_days: i64,
    pub providers: Providers,
    pub normalization: Normalization,
    pub music_server_url: String,
    pub database_path: PathBuf,
    pub progress_path: PathBuf,
    pub album_timeout_seconds: u64,
    pub consecutive_fatal_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ratings_common::config::default_data_dir();
        Config {
            weights: Weights::default(),
            features: Features::default(),
            cap_top4_pct: 0.25,
            zscore_threshold: 0.20,
            use_advanced_detection: false,
            rate_limits: RateLimits::default(),
            freshness_days: 7,
            providers: Providers::default(),
            normalization: Normalization::default(),
            music_server_url: "http://127.0.0.1:4533".to_string(),
            database_path: data_dir.join("ratings.db"),
            progress_path: data_dir.join("progress.json"),
            album_timeout_seconds: 120,
            consecutive_fatal_threshold: 10,
        }
    }
}

impl Config {
    /// Load from TOML at `path`, falling back to defaults for any
    /// field the file omits. A missing file is not an error (§9:
    /// configuration is a fixed record, unknown keys only warned).
    pub fn load(path: &Path) -> Result<Config> {
        warn_unknown_keys(path);
        let mut config = load_toml::<Config>(path)?.unwrap_or_default();
        if config.weights.profile.as_deref() == Some("alt") {
            config.weights = Weights::alt_profile();
        }
        Ok(config)
    }

    /// Resolve the weight vector actually used this run: the
    /// `[weights]` table as configured, unless renormalization is
    /// required because a provider is disabled (§4.4) or the
    /// configured sum isn't 1 (§6).
    pub fn effective_weights(&self) -> Weights {
        let mut w = self.weights.clone();
        if !self.providers.spotify.enabled {
            w.spotify = 0.0;
        }
        if !self.providers.lastfm.enabled {
            w.lastfm = 0.0;
        }
        if !self.providers.listenbrainz.enabled {
            w.listenbrainz = 0.0;
        }
        renormalize(&mut w);
        w
    }
}

const KNOWN_TOP_LEVEL_KEYS: &[&str] = &[
    "weights",
    "features",
    "cap_top4_pct",
    "zscore_threshold",
    "use_advanced_detection",
    "rate_limits",
    "freshness_days",
    "providers",
    "normalization",
    "music_server_url",
    "database_path",
    "progress_path",
    "album_timeout_seconds",
    "consecutive_fatal_threshold",
];

const KNOWN_PROVIDER_KEYS: &[&str] = &["spotify", "lastfm", "listenbrainz", "musicbrainz", "discogs"];

/// Warn (never fail) on TOML keys this config record doesn't recognize
/// (§9: dynamic-config-with-unspecified-schema requirement). Best-effort:
/// a missing or unparseable file is silently skipped here since
/// `load_toml` reports that outcome on the real load.
fn warn_unknown_keys(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else { return };
    let Ok(raw) = content.parse::<toml::Value>() else { return };
    let Some(table) = raw.as_table() else { return };

    for key in table.keys() {
        if !KNOWN_TOP_LEVEL_KEYS.contains(&key.as_str()) {
            warn!("unrecognized configuration key `{key}` ignored");
        }
    }
    if let Some(providers) = table.get("providers").and_then(|v| v.as_table()) {
        for key in providers.keys() {
            if !KNOWN_PROVIDER_KEYS.contains(&key.as_str()) {
                warn!("unrecognized configuration key `providers.{key}` ignored");
            }
        }
    }
}

/// Renormalize a weight vector to sum to 1, leaving an all-zero vector
/// untouched (the caller treats that as "no sources available").
fn renormalize(w: &mut Weights) {
    let sum = w.sum();
    if sum <= 0.0 {
        return;
    }
    w.spotify /= sum;
    w.lastfm /= sum;
    w.listenbrainz /= sum;
    w.age /= sum;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_weights_sum_to_one() {
        let w = Weights::default();
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn alt_profile_sums_to_one() {
        let w = Weights::alt_profile();
        assert!((w.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn effective_weights_renormalizes_when_provider_disabled() {
        let mut cfg = Config::default();
        cfg.providers.listenbrainz.enabled = false;
        let w = cfg.effective_weights();
        assert!((w.sum() - 1.0).abs() < 1e-9);
        assert_eq!(w.listenbrainz, 0.0);
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let cfg = Config::load(Path::new("/nonexistent/ratings-core.toml")).unwrap();
        assert_eq!(cfg.cap_top4_pct, 0.25);
    }

    #[test]
    fn load_tolerates_unrecognized_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings-core.toml");
        std::fs::write(&path, "cap_top4_pct = 0.4\nsome_future_knob = true\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.cap_top4_pct, 0.4);
    }

    #[test]
    fn load_selects_alt_weight_profile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ratings-core.toml");
        std::fs::write(&path, "[weights]\nprofile = \"alt\"\n").unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.weights.spotify, 0.4);
        assert_eq!(cfg.weights.lastfm, 0.3);
    }
}

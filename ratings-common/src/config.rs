//! Generic TOML/ENV configuration plumbing shared by the core pipeline.
//!
//! The concrete configuration record lives in `ratings-core::config`
//! (its shape is pipeline-specific); this module only provides the
//! tier-resolution helpers and default-path lookup the pipeline's
//! loader is built on, following the database-then-env-then-toml
//! priority pattern used throughout the rest of this codebase.

use crate::{Error, Result};
use std::path::PathBuf;
use tracing::warn;

/// Resolve a string setting across three tiers, in priority order.
/// Warns (but does not fail) if more than one tier supplies a value.
pub fn resolve_tiered(
    label: &str,
    db_value: Option<String>,
    env_var: &str,
    toml_value: Option<String>,
) -> Option<String> {
    let env_value = std::env::var(env_var).ok().filter(|v| !v.trim().is_empty());

    let present = [
        db_value.as_ref().map(|_| "database"),
        env_value.as_ref().map(|_| "environment"),
        toml_value.as_ref().map(|_| "TOML"),
    ];
    let sources: Vec<&str> = present.into_iter().flatten().collect();
    if sources.len() > 1 {
        warn!(
            "{label} found in multiple sources: {}. Using the highest-priority one.",
            sources.join(", ")
        );
    }

    db_value.or(env_value).or(toml_value)
}

/// Default per-user config directory for the ratings engine
/// (`~/.config/ratings-engine` on Linux, platform equivalent elsewhere).
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("ratings-engine"))
        .unwrap_or_else(|| PathBuf::from("./ratings-engine"))
}

/// Default per-user data directory, used for the SQLite database and
/// the progress snapshot file when no explicit path is configured.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("ratings-engine"))
        .unwrap_or_else(|| PathBuf::from("./ratings-engine"))
}

/// Read and parse a TOML file into `T`, returning `Ok(None)` if the
/// file does not exist (not configuring via TOML is not an error).
pub fn load_toml<T: serde::de::DeserializeOwned>(path: &std::path::Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    let value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_tiered_prefers_database_over_env_and_toml() {
        let result = resolve_tiered(
            "test key",
            Some("from-db".to_string()),
            "RATINGS_ENGINE_TEST_KEY_NONEXISTENT",
            Some("from-toml".to_string()),
        );
        assert_eq!(result.as_deref(), Some("from-db"));
    }

    #[test]
    fn resolve_tiered_falls_back_to_toml_when_nothing_else_present() {
        let result = resolve_tiered(
            "test key",
            None,
            "RATINGS_ENGINE_TEST_KEY_NONEXISTENT",
            Some("from-toml".to_string()),
        );
        assert_eq!(result.as_deref(), Some("from-toml"));
    }

    #[test]
    fn load_toml_missing_file_is_none() {
        #[derive(serde::Deserialize)]
        struct Empty {}
        let result: Option<Empty> = load_toml(std::path::Path::new("/nonexistent/path.toml")).unwrap();
        assert!(result.is_none());
    }
}

//! Title/artist normalization and alternate-version detection (§4.4,
//! §4.6, §9).

use regex::Regex;

/// Lowercase, strip punctuation, collapse whitespace — the identity
/// normalization used for artist names (§3) and album/track titles
/// (§4.6) alike.
pub fn normalize_text(s: &str) -> String {
    let lowered = s.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Non-single title patterns that reject a track outright in C6 step 1.
pub const NON_SINGLE_PATTERNS: &[&str] = &["intro", "outro", "interlude", "jam", "skit"];

pub fn matches_non_single_pattern(title: &str) -> bool {
    let normalized = normalize_text(title);
    NON_SINGLE_PATTERNS
        .iter()
        .any(|p| normalized.split_whitespace().any(|w| w == *p))
}

/// Matches a parenthetical/bracketed/dash-delimited suffix of `title`
/// against `patterns` (case-insensitive). This is the "alternate
/// version" test shared by the popularity fuser (§4.4) and the single
/// detector's context rules (§4.6).
pub struct AlternateVersionMatcher {
    regexes: Vec<Regex>,
}

impl AlternateVersionMatcher {
    pub fn new(patterns: &[String]) -> Self {
        let regexes = patterns
            .iter()
            .filter_map(|p| {
                let escaped = regex::escape(p);
                Regex::new(&format!(r"(?i)\b{escaped}\b")).ok()
            })
            .collect();
        AlternateVersionMatcher { regexes }
    }

    /// True if any configured pattern appears in a parenthetical,
    /// bracketed, or dash-delimited suffix of the title.
    pub fn is_alternate_version(&self, title: &str) -> bool {
        let suffix = extract_suffix(title);
        let Some(suffix) = suffix else { return false };
        self.regexes.iter().any(|re| re.is_match(&suffix))
    }

    pub fn is_live_or_unplugged(&self, title: &str) -> bool {
        let suffix = extract_suffix(title).unwrap_or_default();
        let lower = suffix.to_lowercase();
        lower.contains("live") || lower.contains("unplugged")
    }
}

/// Extract the content of the last `(...)`/`[...]` group, or the text
/// after the last " - " separator, whichever is present.
fn extract_suffix(title: &str) -> Option<String> {
    if let Some(start) = title.rfind('(') {
        if let Some(end) = title[start..].find(')') {
            return Some(title[start + 1..start + end].to_string());
        }
    }
    if let Some(start) = title.rfind('[') {
        if let Some(end) = title[start..].find(']') {
            return Some(title[start + 1..start + end].to_string());
        }
    }
    title.rsplit_once(" - ").map(|(_, suffix)| suffix.to_string())
}

/// Duration-tolerance match used when identifying alternate versions /
/// the same recording across releases (§4.2, §4.4): within ±2 s.
pub fn durations_match(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => (a - b).abs() <= 2.0,
        _ => false,
    }
}

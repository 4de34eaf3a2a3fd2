//! Single detector (C6, §4.6).

use crate::model::{AlbumCtx, SingleConfidence};
use crate::normalize::{matches_non_single_pattern, AlternateVersionMatcher};
use crate::signals::TrackSignals;

#[derive(Debug, Clone)]
pub struct SingleDetectionInput<'a> {
    pub title: &'a str,
    pub album_ctx: &'a AlbumCtx,
    pub signals: &'a TrackSignals,
    pub discogs_has_single_format: bool,
    pub discogs_has_official_video: bool,
    pub discogs_is_short_release: bool,
    pub album_zscore: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleDetection {
    pub is_single: bool,
    pub confidence: SingleConfidence,
    pub sources: Vec<String>,
}

struct Evidence {
    name: &'static str,
    weight: u32,
    hit: bool,
}

/// Run the full §4.6 procedure for one track.
pub fn detect_single(
    input: &SingleDetectionInput,
    matcher: &AlternateVersionMatcher,
    use_advanced_detection: bool,
    zscore_threshold: f64,
) -> SingleDetection {
    // Step 1: pre-filter.
    if matches_non_single_pattern(input.title) {
        return SingleDetection {
            is_single: false,
            confidence: SingleConfidence::High,
            sources: vec![],
        };
    }
    // Step 2: context rules.
    let studio_live_title = !input.album_ctx.is_live
        && !input.album_ctx.is_unplugged
        && matcher.is_live_or_unplugged(input.title);

    let ignore_studio_singles = input.album_ctx.is_live || input.album_ctx.is_unplugged;

    // On a compilation, Spotify/MusicBrainz/Last.fm evidence describes
    // the track's *original* release, not this compilation's own issue
    // — only Discogs evidence (resolved against this specific release)
    // is trustworthy here (§4.6 compilation rule).
    let ignore_historical_singles = input.album_ctx.is_compilation;

    // Step 3: weighted evidence.
    let spotify_hit = !ignore_studio_singles
        && !ignore_historical_singles
        && input.signals.spotify_album_type.as_deref() == Some("single");
    let mb_hit = !ignore_studio_singles
        && !ignore_historical_singles
        && input.signals.mb_release_group_primary_type.as_deref() == Some("single");
    let discogs_single_hit = input.discogs_has_single_format;
    let discogs_video_hit = input.discogs_has_official_video;
    let short_release_hit = input.discogs_is_short_release;
    let lastfm_hit = !ignore_historical_singles
        && input
            .signals
            .lastfm_top_tags
            .iter()
            .any(|t| t.eq_ignore_ascii_case("single"));

    let evidence = [
        Evidence { name: "spotify", weight: 50, hit: spotify_hit },
        Evidence { name: "musicbrainz", weight: 50, hit: mb_hit },
        Evidence { name: "discogs", weight: 100, hit: discogs_single_hit },
        Evidence { name: "discogs_video", weight: 30, hit: discogs_video_hit },
        Evidence { name: "short_release", weight: 15, hit: short_release_hit },
        Evidence { name: "lastfm", weight: 20, hit: lastfm_hit },
    ];

    let hits: Vec<&Evidence> = evidence.iter().filter(|e| e.hit).collect();
    let total_weight: u32 = hits.iter().map(|e| e.weight).sum();
    let has_strong_hit = hits.iter().any(|e| e.weight >= 50);

    // Step 4: aggregate confidence.
    let mut confidence = if total_weight >= 100 && hits.len() >= 2 && has_strong_hit {
        SingleConfidence::High
    } else if total_weight >= 50 {
        SingleConfidence::Medium
    } else {
        SingleConfidence::Low
    };

    // Step 2 continued: a studio track titled "(live)"/"(unplugged)" on
    // a studio album is treated as an alternate and downgraded one step.
    if studio_live_title {
        confidence = downgrade(confidence);
    }

    let mut is_single = matches!(confidence, SingleConfidence::Medium | SingleConfidence::High);

    // Step 5: optional stricter gate.
    if use_advanced_detection {
        let metadata_single = spotify_hit || mb_hit;
        let zscore_ok = input.album_zscore.map(|z| z >= zscore_threshold).unwrap_or(false);
        is_single = is_single && metadata_single && zscore_ok;
        if !is_single {
            confidence = SingleConfidence::Low;
        }
    }

    let sources = hits.iter().map(|e| e.name.to_string()).collect();

    SingleDetection {
        is_single,
        confidence,
        sources,
    }
}

fn downgrade(c: SingleConfidence) -> SingleConfidence {
    match c {
        SingleConfidence::High => SingleConfidence::Medium,
        SingleConfidence::Medium => SingleConfidence::Low,
        SingleConfidence::Low => SingleConfidence::Low,
    }
}

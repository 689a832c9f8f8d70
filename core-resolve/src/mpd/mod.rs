//! # Adaptive Manifest Queries
//!
//! Extracts either a direct single-file URL or a segment template from an
//! adaptive (MPD/DASH) manifest.
//!
//! Two interchangeable implementations of one [`ManifestQuery`] interface
//! exist: a DOM-capable parser built on `quick-xml`
//! ([`DomManifestQuery`](dom::DomManifestQuery)) and a regular-expression
//! fallback ([`RegexManifestQuery`](regex::RegexManifestQuery)). They produce
//! equivalent results for well-formed input; which one runs is an
//! environment-capability choice made once at startup, not a behavioral
//! difference.

pub mod dom;
pub mod regex;

use crate::error::{ResolveError, Result};
use crate::model::{SegmentTemplate, TimelineEntry};
use std::sync::Arc;

pub use dom::DomManifestQuery;
pub use regex::RegexManifestQuery;

/// Canonical lossless codec name used for representation preference.
pub(crate) const LOSSLESS_CODEC: &str = "flac";

/// Query interface over an adaptive manifest.
///
/// Callers must check [`segment_template`](ManifestQuery::segment_template)
/// first: the presence of a segment template means no direct URL is to be
/// attempted.
pub trait ManifestQuery: Send + Sync {
    /// Segment template of the preferred representation, if the manifest is
    /// segmented.
    ///
    /// # Errors
    ///
    /// [`ResolveError::ManifestUnparsable`] when the document cannot be read
    /// or a template element is missing its URL templates.
    fn segment_template(&self, mpd: &str) -> Result<Option<SegmentTemplate>>;

    /// Best single-file URL discoverable among the manifest's BaseURL
    /// values, or `None`.
    fn single_file_url(&self, mpd: &str) -> Option<String>;
}

/// Default query implementation (DOM-capable).
pub fn default_query() -> Arc<dyn ManifestQuery> {
    Arc::new(DomManifestQuery::new())
}

// ============================================================================
// Shared document model
// ============================================================================

/// One representation's worth of extracted manifest data. Both parser
/// implementations reduce the document to this shape before selection.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Representation {
    pub codecs: Option<String>,
    pub base_urls: Vec<String>,
    pub template: Option<RawTemplate>,
}

/// Raw segment-template attributes before validation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct RawTemplate {
    pub initialization: Option<String>,
    pub media: Option<String>,
    pub start_number: Option<u64>,
    pub timeline: Vec<TimelineEntry>,
}

impl Representation {
    fn has_lossless_codec(&self) -> bool {
        self.codecs
            .as_deref()
            .map(|c| c.to_ascii_lowercase().contains(LOSSLESS_CODEC))
            .unwrap_or(false)
    }
}

// ============================================================================
// Selection
// ============================================================================

/// Pick and validate the segment template, preferring the representation
/// declaring the canonical lossless codec.
pub(crate) fn select_segment_template(
    representations: &[Representation],
) -> Result<Option<SegmentTemplate>> {
    let chosen = representations
        .iter()
        .filter(|rep| rep.template.is_some())
        .max_by_key(|rep| rep.has_lossless_codec());

    let Some(rep) = chosen else {
        return Ok(None);
    };
    let raw = rep.template.as_ref().and_then(|t| {
        // A template with no attributes at all is noise, not a template.
        if t.initialization.is_none() && t.media.is_none() && t.timeline.is_empty() {
            None
        } else {
            Some(t)
        }
    });
    let Some(raw) = raw else {
        return Ok(None);
    };

    let initialization = raw.initialization.clone().ok_or_else(|| {
        ResolveError::ManifestUnparsable {
            detail: "segment template missing initialization URL".to_string(),
        }
    })?;
    let media = raw
        .media
        .clone()
        .ok_or_else(|| ResolveError::ManifestUnparsable {
            detail: "segment template missing media URL template".to_string(),
        })?;

    Ok(Some(SegmentTemplate {
        init_url_template: initialization,
        media_url_template: media,
        start_number: raw.start_number.unwrap_or(1),
        timeline: raw.timeline.clone(),
        base_url: rep.base_urls.first().cloned(),
        codec_hint: rep.codecs.clone(),
    }))
}

/// Score all candidate BaseURL values and return the best single-file URL.
///
/// Discards namespace/schema-looking and non-media-looking URLs, then scores
/// by (codec match, "hires" substring, lossless extension, access-token query
/// parameter). The scoring is a heuristic and may in edge cases prefer a
/// non-lossless URL over a valid lossless one; kept as-is.
pub(crate) fn select_single_file(representations: &[Representation]) -> Option<String> {
    let mut best: Option<(u32, &str)> = None;

    for rep in representations {
        let codec_match = rep.has_lossless_codec();
        for url in &rep.base_urls {
            if looks_like_namespace(url) || !looks_like_media(url) {
                continue;
            }
            let score = score_candidate(url, codec_match);
            match best {
                Some((best_score, _)) if best_score >= score => {}
                _ => best = Some((score, url)),
            }
        }
    }

    best.map(|(_, url)| url.to_string())
}

fn score_candidate(url: &str, codec_match: bool) -> u32 {
    let lower = url.to_ascii_lowercase();
    let mut score = 0;
    if codec_match {
        score += 8;
    }
    if lower.contains("hires") || lower.contains("hi_res") || lower.contains("hi-res") {
        score += 4;
    }
    if path_of(&lower).ends_with(".flac") {
        score += 2;
    }
    if query_of(&lower).contains("token") {
        score += 1;
    }
    score
}

fn looks_like_namespace(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("urn:") || lower.contains("xmlns") || lower.contains("schemas.")
}

fn looks_like_media(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    if !(lower.starts_with("http://") || lower.starts_with("https://")) {
        return false;
    }
    const MEDIA_EXTENSIONS: [&str; 6] = [".flac", ".mp4", ".m4a", ".aac", ".mp3", ".wav"];
    let path = path_of(&lower);
    MEDIA_EXTENSIONS.iter().any(|ext| path.ends_with(ext)) || !query_of(&lower).is_empty()
}

fn path_of(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

fn query_of(url: &str) -> &str {
    url.split_once('?').map(|(_, q)| q).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(codecs: Option<&str>, base_urls: &[&str]) -> Representation {
        Representation {
            codecs: codecs.map(str::to_string),
            base_urls: base_urls.iter().map(|s| s.to_string()).collect(),
            template: None,
        }
    }

    #[test]
    fn namespace_urls_are_discarded() {
        let reps = [rep(
            None,
            &[
                "urn:mpeg:dash:schema:mpd:2011",
                "http://schemas.example.com/mpd",
                "https://cdn.example.com/track.flac",
            ],
        )];
        assert_eq!(
            select_single_file(&reps),
            Some("https://cdn.example.com/track.flac".to_string())
        );
    }

    #[test]
    fn codec_match_outweighs_all_other_signals() {
        let reps = [
            rep(Some("flac"), &["https://cdn.example.com/plain.mp4"]),
            rep(
                Some("mp4a.40.2"),
                &["https://cdn.example.com/hires_track.flac?token=abc"],
            ),
        ];
        // flac codec (8) beats hires + .flac + token (7).
        assert_eq!(
            select_single_file(&reps),
            Some("https://cdn.example.com/plain.mp4".to_string())
        );
    }

    #[test]
    fn tie_breaks_by_remaining_signals() {
        let reps = [rep(
            Some("flac"),
            &[
                "https://cdn.example.com/track.mp4",
                "https://cdn.example.com/track.flac",
            ],
        )];
        assert_eq!(
            select_single_file(&reps),
            Some("https://cdn.example.com/track.flac".to_string())
        );
    }

    #[test]
    fn no_media_urls_yields_none() {
        let reps = [rep(None, &["urn:mpeg:dash:schema:mpd:2011", "relative/path"])];
        assert_eq!(select_single_file(&reps), None);
    }

    #[test]
    fn template_without_media_url_is_unparsable() {
        let reps = [Representation {
            codecs: Some("flac".into()),
            base_urls: vec![],
            template: Some(RawTemplate {
                initialization: Some("https://cdn.example.com/init.mp4".into()),
                media: None,
                start_number: None,
                timeline: vec![],
            }),
        }];
        let err = select_segment_template(&reps).unwrap_err();
        assert!(matches!(err, ResolveError::ManifestUnparsable { .. }));
    }

    #[test]
    fn start_number_defaults_to_one() {
        let reps = [Representation {
            codecs: None,
            base_urls: vec![],
            template: Some(RawTemplate {
                initialization: Some("init.mp4".into()),
                media: Some("media_$Number$.mp4".into()),
                start_number: None,
                timeline: vec![],
            }),
        }];
        let template = select_segment_template(&reps).unwrap().unwrap();
        assert_eq!(template.start_number, 1);
    }

    #[test]
    fn lossless_representation_template_is_preferred() {
        let aac_template = RawTemplate {
            initialization: Some("aac_init.mp4".into()),
            media: Some("aac_$Number$.mp4".into()),
            start_number: None,
            timeline: vec![],
        };
        let flac_template = RawTemplate {
            initialization: Some("flac_init.mp4".into()),
            media: Some("flac_$Number$.mp4".into()),
            start_number: None,
            timeline: vec![],
        };
        let reps = [
            Representation {
                codecs: Some("mp4a.40.2".into()),
                base_urls: vec![],
                template: Some(aac_template),
            },
            Representation {
                codecs: Some("flac".into()),
                base_urls: vec![],
                template: Some(flac_template),
            },
        ];
        let template = select_segment_template(&reps).unwrap().unwrap();
        assert_eq!(template.init_url_template, "flac_init.mp4");
        assert_eq!(template.codec_hint.as_deref(), Some("flac"));
    }
}

//! # Resolution Data Model
//!
//! Core types shared across the resolution pipeline: track references,
//! manifest payloads, segment templates, and resolved sources.

use crate::quality::Quality;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Track Identity
// ============================================================================

/// Opaque upstream track identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reference to a track, with an optional best-known-quality capability hint
/// supplied by the metadata collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    pub id: TrackId,
    /// Highest tier this track is known to support, when known.
    pub capability: Option<Quality>,
}

impl TrackRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: TrackId::new(id),
            capability: None,
        }
    }

    pub fn with_capability(mut self, capability: Quality) -> Self {
        self.capability = Some(capability);
        self
    }
}

// ============================================================================
// Manifest Types
// ============================================================================

/// Raw manifest payload as delivered by the upstream playback-info call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPayload {
    /// Encoded (usually base64) manifest text.
    pub text: String,
    /// Declared content type of the decoded manifest.
    pub mime_type: String,
}

/// A decoded, classified manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedManifest {
    /// Adaptive segmented manifest (MPD/DASH) kept as text for the player.
    Adaptive { text: String, mime_type: String },
    /// Plain list of directly fetchable URLs, in upstream order.
    Direct { urls: Vec<String>, mime_type: String },
}

/// One `(duration, repeat)` entry of a segment timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    /// Duration of each segment covered by this entry, in timescale units.
    pub duration_units: u64,
    /// Number of additional repetitions; the entry yields `repeat + 1`
    /// segments.
    pub repeat: u32,
}

/// Template describing how to build per-segment URLs from a numeric pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTemplate {
    pub init_url_template: String,
    pub media_url_template: String,
    /// First media segment number; upstream default is 1.
    pub start_number: u64,
    /// Ordered timeline. Empty means exactly one implicit media segment.
    pub timeline: Vec<TimelineEntry>,
    /// Optional base URL every template URL is resolved against.
    pub base_url: Option<String>,
    /// Codec declared by the owning representation, e.g. `flac`.
    pub codec_hint: Option<String>,
}

impl SegmentTemplate {
    /// Total number of media segments the timeline expands to.
    ///
    /// An empty timeline still yields one implicit segment.
    pub fn media_segment_count(&self) -> u64 {
        if self.timeline.is_empty() {
            1
        } else {
            self.timeline
                .iter()
                .map(|entry| entry.repeat as u64 + 1)
                .sum()
        }
    }
}

// ============================================================================
// Resolved Sources
// ============================================================================

/// Optional audio characteristics reported by the upstream alongside a
/// manifest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AudioCharacteristics {
    pub sample_rate_hz: Option<u32>,
    pub bit_depth: Option<u16>,
    pub replay_gain_db: Option<f32>,
}

/// A concretely fetchable/playable byte source for one `(track, quality)`.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    /// One URL serving the entire asset.
    SingleUrl { url: String },
    /// Adaptive manifest handed to the player verbatim; no eager
    /// reconstruction on the streaming path.
    AdaptiveStream { manifest: String },
    /// Fully reconstructed contiguous asset (export path).
    ReconstructedBytes { data: Bytes, mime_type: String },
}

impl ResolvedSource {
    /// Returns `true` if this source holds a transient in-memory buffer that
    /// must be released when the source is discarded.
    pub fn is_transient(&self) -> bool {
        matches!(self, ResolvedSource::ReconstructedBytes { .. })
    }

    /// Size of the held buffer, if any.
    pub fn buffered_len(&self) -> Option<usize> {
        match self {
            ResolvedSource::ReconstructedBytes { data, .. } => Some(data.len()),
            _ => None,
        }
    }
}

/// Outcome of a successful resolution: the source plus reported audio
/// characteristics.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub source: ResolvedSource,
    /// Tier that actually succeeded (after any degradation).
    pub quality: Quality,
    pub characteristics: AudioCharacteristics,
}

/// Contiguous buffer produced by the export path.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedAsset {
    pub data: Bytes,
    pub mime_type: String,
    pub quality: Quality,
    pub characteristics: AudioCharacteristics,
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Phase a byte-producing operation is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStage {
    Downloading,
    Reconstructing,
}

/// Progress notification emitted during direct download and reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub stage: ProgressStage,
    pub received_bytes: u64,
    pub total_bytes: Option<u64>,
}

/// Host-supplied progress observer.
pub type ProgressCallback = Arc<dyn Fn(ProgressUpdate) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_ref_builder() {
        let track = TrackRef::new("1857342").with_capability(Quality::Lossless);
        assert_eq!(track.id.as_str(), "1857342");
        assert_eq!(track.capability, Some(Quality::Lossless));
    }

    #[test]
    fn empty_timeline_counts_one_implicit_segment() {
        let template = SegmentTemplate {
            init_url_template: "init.mp4".into(),
            media_url_template: "media_$Number$.mp4".into(),
            start_number: 1,
            timeline: vec![],
            base_url: None,
            codec_hint: None,
        };
        assert_eq!(template.media_segment_count(), 1);
    }

    #[test]
    fn timeline_counts_repeats() {
        let template = SegmentTemplate {
            init_url_template: "init.mp4".into(),
            media_url_template: "media_$Number$.mp4".into(),
            start_number: 1,
            timeline: vec![
                TimelineEntry {
                    duration_units: 1000,
                    repeat: 2,
                },
                TimelineEntry {
                    duration_units: 500,
                    repeat: 0,
                },
            ],
            base_url: None,
            codec_hint: None,
        };
        assert_eq!(template.media_segment_count(), 4);
    }

    #[test]
    fn transient_source_classification() {
        let single = ResolvedSource::SingleUrl {
            url: "https://cdn.example.com/track.flac".into(),
        };
        assert!(!single.is_transient());
        assert_eq!(single.buffered_len(), None);

        let reconstructed = ResolvedSource::ReconstructedBytes {
            data: Bytes::from_static(&[1, 2, 3]),
            mime_type: "audio/mp4".into(),
        };
        assert!(reconstructed.is_transient());
        assert_eq!(reconstructed.buffered_len(), Some(3));
    }
}

//! # Stream Resolution Core
//!
//! Resolves a requested audio-quality tier for a track into a concretely
//! fetchable or playable byte source, against an upstream service that
//! returns inconsistent manifest encodings and intermittently fails.
//!
//! ## Overview
//!
//! The engine reconciles:
//! - Multiple manifest encodings (direct URL lists vs. adaptive segmented
//!   manifests)
//! - An ordered quality-degradation policy
//! - Segment-by-segment reconstruction of one continuous asset from an
//!   adaptive manifest
//! - Bounded-memory caching across track changes
//! - Cancellation semantics when a user skips tracks faster than the
//!   network responds
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            ResolutionEngine                  │
//! │                                              │
//! │  quality policy → tier attempt loop          │
//! │  TrackInfoFetcher (retry + token refresh)    │
//! │  manifest classifier → ManifestQuery (MPD)   │
//! │  SegmentReconstructor (export path only)     │
//! └───────┬──────────────────────────┬───────────┘
//!         │ ResolutionCache          │ SequenceGuard
//!         ▼                          ▼
//!   per-(track, quality) memo   monotonic tickets,
//!   pruned on track change      stale results discarded
//! ```
//!
//! Playback UI, tag embedding, metadata search, and session storage are
//! external collaborators; this crate only turns `(track, quality)` into a
//! playable source.

mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod model;
pub mod mpd;
pub mod provider;
pub mod quality;
pub mod reconstruct;
mod ticket;

pub use config::{ConfigError, ResolveConfig};
pub use engine::{ResolutionEngine, ResolveOutcome, ResolveState};
pub use error::{ResolveError, Result};
pub use model::{
    AudioCharacteristics, DecodedManifest, ExportedAsset, ManifestPayload, ProgressCallback,
    ProgressStage, ProgressUpdate, Resolution, ResolvedSource, SegmentTemplate, TimelineEntry,
    TrackId, TrackRef,
};
pub use mpd::{default_query, DomManifestQuery, ManifestQuery, RegexManifestQuery};
pub use provider::{PlaybackInfo, ProviderError, SessionRefresher, TrackInfoProvider};
pub use quality::{fallback_chain, Quality};

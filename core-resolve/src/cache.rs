//! # Resolution Cache
//!
//! Keyed by `(track, quality)`. Retention is policy-driven, not
//! recency-driven: on a track change the cache keeps every tier of the
//! current track plus hi-res entries of the next track, and drops everything
//! else. Dropped entries holding reconstructed buffers log the released size.

use crate::model::{Resolution, TrackId};
use crate::quality::Quality;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
pub(crate) struct ResolutionCache {
    entries: HashMap<(TrackId, Quality), Resolution>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track: &TrackId, quality: Quality) -> Option<&Resolution> {
        self.entries.get(&(track.clone(), quality))
    }

    pub fn insert(&mut self, track: TrackId, quality: Quality, resolution: Resolution) {
        self.entries.insert((track, quality), resolution);
    }

    /// Drop entries for `track`: one tier, or every tier when `quality` is
    /// `None`.
    pub fn invalidate(&mut self, track: &TrackId, quality: Option<Quality>) {
        self.prune(
            |(entry_track, entry_quality)| {
                entry_track != track || quality.is_some_and(|q| q != *entry_quality)
            },
            "invalidated",
        );
    }

    /// Apply the track-change retention policy: all tiers of `current`, only
    /// hi-res tiers of `next`.
    pub fn retain_for(&mut self, current: &TrackId, next: Option<&TrackId>) {
        self.prune(
            |(track, quality)| {
                track == current || (Some(track) == next && quality.is_hi_res())
            },
            "evicted on track change",
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    fn prune(&mut self, keep: impl Fn(&(TrackId, Quality)) -> bool, reason: &str) {
        let mut dropped = 0usize;
        let mut released_bytes = 0usize;
        self.entries.retain(|key, resolution| {
            if keep(key) {
                return true;
            }
            dropped += 1;
            released_bytes += resolution.source.buffered_len().unwrap_or(0);
            false
        });
        if dropped > 0 {
            debug!(dropped, released_bytes, reason, "cache entries released");
        }
    }
}

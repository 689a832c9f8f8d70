//! # Resolution Engine
//!
//! Orchestrates the full pipeline: quality-tier fallback, manifest fetch and
//! classification, source selection, caching, supersession, and preload.
//!
//! Concurrency model: every resolution takes a ticket from the sequence
//! guard; issuing a new ticket cancels the previous one. Only the current
//! ticket may commit its result to the cache or the observable state. A
//! superseded resolution reports [`ResolveOutcome::Superseded`] instead of
//! its stale success or failure.

use crate::cache::ResolutionCache;
use crate::config::ResolveConfig;
use crate::error::{ResolveError, Result};
use crate::fetcher::TrackInfoFetcher;
use crate::manifest;
use crate::model::{
    DecodedManifest, ExportedAsset, ProgressCallback, Resolution, ResolvedSource, TrackId,
    TrackRef,
};
use crate::mpd::{self, ManifestQuery};
use crate::provider::{PlaybackInfo, SessionRefresher, TrackInfoProvider};
use crate::quality::{fallback_chain, Quality};
use crate::reconstruct::SegmentReconstructor;
use crate::ticket::{SequenceGuard, Ticket};
use bridge_traits::http::HttpClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Outcome of a resolution request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// The resolution completed and was committed.
    Resolved(Resolution),
    /// A newer request took over before this one could commit; its result
    /// was discarded.
    Superseded,
}

/// Externally observable engine state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResolveState {
    #[default]
    Idle,
    Resolving {
        track: TrackId,
    },
    Ready {
        track: TrackId,
        quality: Quality,
    },
    Failed {
        track: TrackId,
    },
}

#[derive(Default)]
struct EngineState {
    cache: ResolutionCache,
    guard: SequenceGuard,
    observable: ResolveState,
}

/// The resolution engine. Cheap to share behind an `Arc`; all mutable state
/// sits behind one async mutex held only for short, non-I/O sections.
pub struct ResolutionEngine {
    fetcher: TrackInfoFetcher,
    reconstructor: SegmentReconstructor,
    query: Arc<dyn ManifestQuery>,
    config: ResolveConfig,
    progress: Option<ProgressCallback>,
    state: Mutex<EngineState>,
}

impl ResolutionEngine {
    pub fn new(
        provider: Arc<dyn TrackInfoProvider>,
        http: Arc<dyn HttpClient>,
        config: ResolveConfig,
    ) -> Self {
        Self {
            fetcher: TrackInfoFetcher::new(provider, config.retry.clone()),
            reconstructor: SegmentReconstructor::new(http),
            query: mpd::default_query(),
            config,
            progress: None,
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Attach a session refresher for 401 token-expiry recovery.
    pub fn with_refresher(mut self, refresher: Arc<dyn SessionRefresher>) -> Self {
        self.fetcher = self.fetcher.with_refresher(refresher);
        self
    }

    /// Swap the manifest query implementation (e.g. the regex fallback).
    pub fn with_query(mut self, query: Arc<dyn ManifestQuery>) -> Self {
        self.query = query;
        self
    }

    /// Attach a progress observer for download/reconstruction phases.
    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Current observable state.
    pub async fn state(&self) -> ResolveState {
        self.state.lock().await.observable.clone()
    }

    // ========================================================================
    // Streaming Resolution
    // ========================================================================

    /// Resolve `track` at `requested` quality into a playable source.
    ///
    /// Walks the fallback chain tier by tier; each tier failure degrades to
    /// the next. The cache is consulted first, in chain order. A request
    /// started after this one supersedes it: the stale result, success or
    /// failure, is discarded and [`ResolveOutcome::Superseded`] is returned.
    ///
    /// # Errors
    ///
    /// [`ResolveError::ResolutionFailed`] carrying the most specific failure
    /// among the attempted tiers, only when this request is still current.
    #[instrument(skip(self, track), fields(track = %track.id, %requested))]
    pub async fn resolve(&self, track: &TrackRef, requested: Quality) -> Result<ResolveOutcome> {
        let chain = fallback_chain(requested, track.capability);

        let ticket = {
            let mut state = self.state.lock().await;
            for quality in &chain {
                if let Some(hit) = state.cache.get(&track.id, *quality) {
                    debug!(%quality, "cache hit");
                    let resolution = hit.clone();
                    // A cache hit is still a newer resolution: it must take
                    // the latest ticket so an older in-flight resolve cannot
                    // commit a stale result over it.
                    state.guard.issue();
                    state.observable = ResolveState::Ready {
                        track: track.id.clone(),
                        quality: resolution.quality,
                    };
                    return Ok(ResolveOutcome::Resolved(resolution));
                }
            }
            let ticket = state.guard.issue();
            state.observable = ResolveState::Resolving {
                track: track.id.clone(),
            };
            ticket
        };

        let mut most_specific: Option<ResolveError> = None;
        for quality in chain {
            if ticket.cancel.is_cancelled() {
                return Ok(ResolveOutcome::Superseded);
            }
            match self.attempt_tier(track, quality).await {
                Ok(resolution) => return self.commit(track, resolution, &ticket).await,
                Err(e) if e.is_cancelled() => return Ok(ResolveOutcome::Superseded),
                Err(e) => {
                    warn!(%quality, error = %e, "tier failed, degrading");
                    most_specific = Some(keep_most_specific(most_specific.take(), e));
                }
            }
        }

        let mut state = self.state.lock().await;
        if !state.guard.is_current(ticket.serial) {
            return Ok(ResolveOutcome::Superseded);
        }
        state.observable = ResolveState::Failed {
            track: track.id.clone(),
        };
        let cause = most_specific.unwrap_or(ResolveError::TransientTransport {
            status: None,
            detail: "no quality tier could be attempted".to_string(),
        });
        Err(ResolveError::ResolutionFailed {
            track: track.id.to_string(),
            cause: Box::new(cause),
        })
    }

    async fn commit(
        &self,
        track: &TrackRef,
        resolution: Resolution,
        ticket: &Ticket,
    ) -> Result<ResolveOutcome> {
        let mut state = self.state.lock().await;
        if !state.guard.is_current(ticket.serial) {
            debug!("resolution superseded before commit");
            return Ok(ResolveOutcome::Superseded);
        }
        info!(quality = %resolution.quality, "resolution committed");
        state.cache.insert(
            track.id.clone(),
            resolution.quality,
            resolution.clone(),
        );
        state.observable = ResolveState::Ready {
            track: track.id.clone(),
            quality: resolution.quality,
        };
        Ok(ResolveOutcome::Resolved(resolution))
    }

    /// One tier attempt: fetch playback info, classify the manifest, select
    /// the source. Streaming path; never reconstructs.
    async fn attempt_tier(&self, track: &TrackRef, quality: Quality) -> Result<Resolution> {
        let info = self.fetcher.playback_info(&track.id, quality).await?;
        let source = self.select_source(&info, quality)?;
        Ok(Resolution {
            source,
            quality,
            characteristics: info.characteristics(),
        })
    }

    fn select_source(&self, info: &PlaybackInfo, quality: Quality) -> Result<ResolvedSource> {
        if let Some(url) = &info.direct_url {
            return Ok(ResolvedSource::SingleUrl { url: url.clone() });
        }

        match manifest::classify(&info.payload())? {
            DecodedManifest::Direct { urls, .. } => {
                // Classification guarantees a non-empty list.
                let url = urls
                    .into_iter()
                    .next()
                    .ok_or_else(|| ResolveError::ManifestUnparsable {
                        detail: "direct manifest with no URLs".to_string(),
                    })?;
                Ok(ResolvedSource::SingleUrl { url })
            }
            DecodedManifest::Adaptive { text, .. } => {
                match self.query.segment_template(&text)? {
                    Some(_) if quality.is_hi_res() => {
                        // The player consumes the manifest directly; no eager
                        // reconstruction on the streaming path.
                        Ok(ResolvedSource::AdaptiveStream { manifest: text })
                    }
                    Some(_) => Err(ResolveError::ManifestUnparsable {
                        detail: format!("segmented manifest at non-hi-res tier {quality}"),
                    }),
                    None => match self.query.single_file_url(&text) {
                        Some(url) => Ok(ResolvedSource::SingleUrl { url }),
                        None => Err(ResolveError::ManifestUnparsable {
                            detail: "adaptive manifest exposes no usable source".to_string(),
                        }),
                    },
                }
            }
        }
    }

    // ========================================================================
    // Export Resolution
    // ========================================================================

    /// Resolve `track` into one contiguous byte buffer, reconstructing
    /// segmented sources and downloading direct ones.
    ///
    /// Source-selection failures degrade down the chain like streaming
    /// resolution; byte-production failures (segment or direct download) are
    /// terminal. Export never touches the cache or the ticket sequence.
    ///
    /// # Errors
    ///
    /// [`ResolveError::SegmentFetch`] for download failures, or
    /// [`ResolveError::ResolutionFailed`] when no tier yields a source.
    #[instrument(skip(self, track, cancel), fields(track = %track.id, %requested))]
    pub async fn resolve_for_export(
        &self,
        track: &TrackRef,
        requested: Quality,
        cancel: Option<&CancellationToken>,
    ) -> Result<ExportedAsset> {
        let chain = fallback_chain(requested, track.capability);

        let mut most_specific: Option<ResolveError> = None;
        for quality in chain {
            let info = match self.fetcher.playback_info(&track.id, quality).await {
                Ok(info) => info,
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!(%quality, error = %e, "export tier fetch failed, degrading");
                    most_specific = Some(keep_most_specific(most_specific.take(), e));
                    continue;
                }
            };

            let plan = match self.export_plan(&info) {
                Ok(plan) => plan,
                Err(e) => {
                    warn!(%quality, error = %e, "export tier unusable, degrading");
                    most_specific = Some(keep_most_specific(most_specific.take(), e));
                    continue;
                }
            };

            // Byte production is terminal: a half-fetched asset at this tier
            // must not silently degrade into a different-quality file.
            let (data, mime_type) = match plan {
                ExportPlan::Download(url) => {
                    self.reconstructor
                        .download(&url, cancel, self.progress.as_ref())
                        .await?
                }
                ExportPlan::Reconstruct(template) => {
                    self.reconstructor
                        .reconstruct(&template, cancel, self.progress.as_ref())
                        .await?
                }
            };

            info!(%quality, bytes = data.len(), "export complete");
            return Ok(ExportedAsset {
                data,
                mime_type,
                quality,
                characteristics: info.characteristics(),
            });
        }

        let cause = most_specific.unwrap_or(ResolveError::TransientTransport {
            status: None,
            detail: "no quality tier could be attempted".to_string(),
        });
        Err(ResolveError::ResolutionFailed {
            track: track.id.to_string(),
            cause: Box::new(cause),
        })
    }

    fn export_plan(&self, info: &PlaybackInfo) -> Result<ExportPlan> {
        if let Some(url) = &info.direct_url {
            return Ok(ExportPlan::Download(url.clone()));
        }
        match manifest::classify(&info.payload())? {
            DecodedManifest::Direct { urls, .. } => {
                let url = urls
                    .into_iter()
                    .next()
                    .ok_or_else(|| ResolveError::ManifestUnparsable {
                        detail: "direct manifest with no URLs".to_string(),
                    })?;
                Ok(ExportPlan::Download(url))
            }
            DecodedManifest::Adaptive { text, .. } => {
                match self.query.segment_template(&text)? {
                    Some(template) => Ok(ExportPlan::Reconstruct(template)),
                    None => match self.query.single_file_url(&text) {
                        Some(url) => Ok(ExportPlan::Download(url)),
                        None => Err(ResolveError::ManifestUnparsable {
                            detail: "adaptive manifest exposes no usable source".to_string(),
                        }),
                    },
                }
            }
        }
    }

    // ========================================================================
    // Preload
    // ========================================================================

    /// Resolve the next track in the background and cache the result.
    ///
    /// Preload never touches the ticket sequence, so it cannot supersede or
    /// be superseded by a foreground resolution. Failures are logged and
    /// swallowed; the foreground resolve will retry from scratch.
    #[instrument(skip(self, track), fields(track = %track.id, %requested))]
    pub async fn preload(&self, track: &TrackRef, requested: Quality) {
        let chain = fallback_chain(requested, track.capability);

        {
            let state = self.state.lock().await;
            for quality in &chain {
                if state.cache.get(&track.id, *quality).is_some() {
                    debug!(%quality, "preload target already cached");
                    return;
                }
            }
        }

        for quality in chain {
            match self.attempt_tier(track, quality).await {
                Ok(resolution) => {
                    let mut state = self.state.lock().await;
                    state
                        .cache
                        .insert(track.id.clone(), quality, resolution);
                    debug!(%quality, "preload cached");
                    return;
                }
                Err(e) => {
                    warn!(%quality, error = %e, "preload tier failed");
                }
            }
        }
        warn!("preload exhausted all tiers");
    }

    /// Preload `next` when `remaining` playback time enters the configured
    /// window.
    pub async fn maybe_preload(&self, remaining: Duration, next: &TrackRef, requested: Quality) {
        if self.config.should_preload(remaining) {
            self.preload(next, requested).await;
        }
    }

    // ========================================================================
    // Cache Control
    // ========================================================================

    /// Apply the track-change retention policy.
    pub async fn on_track_change(&self, current: &TrackId, next: Option<&TrackId>) {
        let mut state = self.state.lock().await;
        state.cache.retain_for(current, next);
    }

    /// Drop cached resolutions for `track` (e.g. after a runtime playback
    /// failure on a cached manifest): one tier, or all when `quality` is
    /// `None`.
    pub async fn invalidate(&self, track: &TrackId, quality: Option<Quality>) {
        let mut state = self.state.lock().await;
        state.cache.invalidate(track, quality);
    }
}

enum ExportPlan {
    Download(String),
    Reconstruct(crate::model::SegmentTemplate),
}

fn keep_most_specific(current: Option<ResolveError>, candidate: ResolveError) -> ResolveError {
    match current {
        Some(existing) if existing.specificity() > candidate.specificity() => existing,
        _ => candidate,
    }
}

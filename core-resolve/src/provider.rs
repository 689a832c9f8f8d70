//! # Upstream Provider Contract
//!
//! The resolution engine consumes a "playback info" endpoint: one logical
//! call returning the manifest (and audio characteristics) for a track at a
//! given quality tier. Hosts implement [`TrackInfoProvider`] against the real
//! service; tests script it.

use crate::model::{AudioCharacteristics, ManifestPayload, TrackId};
use crate::quality::Quality;
use async_trait::async_trait;
use serde::Deserialize;

/// Upstream sub-status signalling an invalid access token on a 401.
pub const SUB_STATUS_TOKEN_INVALID: u32 = 11002;
/// Upstream sub-status signalling an expired access token on a 401.
pub const SUB_STATUS_TOKEN_EXPIRED: u32 = 11003;

/// Manifest info for one `(track, quality)` as returned by the upstream.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackInfo {
    /// Encoded manifest text.
    pub manifest: String,
    /// Declared content type of the manifest.
    pub manifest_mime_type: String,
    /// Direct URL short-circuit some upstream variants provide.
    #[serde(default)]
    pub direct_url: Option<String>,
    #[serde(default)]
    pub sample_rate_hz: Option<u32>,
    #[serde(default)]
    pub bit_depth: Option<u16>,
    #[serde(default)]
    pub replay_gain_db: Option<f32>,
}

impl PlaybackInfo {
    /// Manifest payload view for the classifier.
    pub fn payload(&self) -> ManifestPayload {
        ManifestPayload {
            text: self.manifest.clone(),
            mime_type: self.manifest_mime_type.clone(),
        }
    }

    /// Audio characteristics reported alongside the manifest.
    pub fn characteristics(&self) -> AudioCharacteristics {
        AudioCharacteristics {
            sample_rate_hz: self.sample_rate_hz,
            bit_depth: self.bit_depth,
            replay_gain_db: self.replay_gain_db,
        }
    }
}

/// Structured upstream failure for a playback-info call.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderError {
    /// HTTP status, when the failure was an HTTP response. `None` means the
    /// transport itself failed.
    pub status: Option<u16>,
    /// Upstream sub-status refining the HTTP status.
    #[serde(default)]
    pub sub_status: Option<u32>,
    pub detail: String,
    #[serde(default)]
    pub user_message: Option<String>,
}

impl ProviderError {
    pub fn transport(detail: impl Into<String>) -> Self {
        Self {
            status: None,
            sub_status: None,
            detail: detail.into(),
            user_message: None,
        }
    }

    pub fn http(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            sub_status: None,
            detail: detail.into(),
            user_message: None,
        }
    }

    pub fn with_sub_status(mut self, sub_status: u32) -> Self {
        self.sub_status = Some(sub_status);
        self
    }

    /// Retryable within the backoff budget: 429, any 5xx, or a transport
    /// failure with no status at all.
    pub fn is_retryable(&self) -> bool {
        match self.status {
            None => true,
            Some(429) => true,
            Some(status) => (500..600).contains(&status),
        }
    }

    /// 401 carrying the upstream invalid/expired-token signal, eligible for
    /// the single refresh retry.
    pub fn is_token_expired(&self) -> bool {
        self.status == Some(401)
            && matches!(
                self.sub_status,
                Some(SUB_STATUS_TOKEN_INVALID) | Some(SUB_STATUS_TOKEN_EXPIRED)
            )
    }

    /// Plain not-found response, meaning no manifest exists at this tier.
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(status) => write!(f, "upstream status {}: {}", status, self.detail),
            None => write!(f, "upstream transport failure: {}", self.detail),
        }
    }
}

impl std::error::Error for ProviderError {}

/// One logical "get manifest info at tier X" upstream call.
#[async_trait]
pub trait TrackInfoProvider: Send + Sync {
    /// Fetch playback info for `track` at `quality`.
    ///
    /// Implementations perform exactly one network call; retry and token
    /// refresh are the fetcher's responsibility.
    async fn playback_info(
        &self,
        track: &TrackId,
        quality: Quality,
    ) -> std::result::Result<PlaybackInfo, ProviderError>;
}

/// One-shot credential refresh used after a token-expired 401.
#[async_trait]
pub trait SessionRefresher: Send + Sync {
    async fn refresh_session(&self) -> std::result::Result<(), ProviderError>;
}

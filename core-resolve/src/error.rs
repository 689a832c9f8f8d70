//! # Resolution Error Types
//!
//! Typed failures for every stage of stream resolution.

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur while resolving a track into a playable source.
#[derive(Error, Debug)]
pub enum ResolveError {
    // ========================================================================
    // Transport Errors
    // ========================================================================
    /// Retryable upstream failure (429/5xx/network); surfaced once the retry
    /// budget is exhausted.
    #[error("Transient transport failure (status {status:?}): {detail}")]
    TransientTransport { status: Option<u16>, detail: String },

    /// Credentials rejected and could not be refreshed.
    #[error("Authentication expired: {detail}")]
    AuthExpired { detail: String },

    // ========================================================================
    // Manifest Errors
    // ========================================================================
    /// Upstream has no manifest for this track/quality.
    #[error("Manifest unavailable: {detail}")]
    ManifestUnavailable { detail: String },

    /// Manifest payload could not be classified or is missing required parts.
    #[error("Manifest unparsable: {detail}")]
    ManifestUnparsable { detail: String },

    // ========================================================================
    // Reconstruction Errors
    // ========================================================================
    /// A segment fetch failed during reconstruction; no partial output exists.
    #[error("Segment fetch failed for {url}: {detail}")]
    SegmentFetch { url: String, detail: String },

    // ========================================================================
    // Terminal Errors
    // ========================================================================
    /// Every quality tier was attempted and failed.
    #[error("Resolution failed for track {track}: {cause}")]
    ResolutionFailed {
        track: String,
        #[source]
        cause: Box<ResolveError>,
    },

    /// Transport plumbing failure outside the retry model.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl ResolveError {
    /// Ranking used to pick the most specific failure across attempted tiers.
    ///
    /// Higher is more specific: a segment or manifest failure tells the user
    /// more than a generic transport error does.
    pub(crate) fn specificity(&self) -> u8 {
        match self {
            ResolveError::SegmentFetch { .. } => 6,
            ResolveError::ManifestUnavailable { .. } => 5,
            ResolveError::ManifestUnparsable { .. } => 4,
            ResolveError::AuthExpired { .. } => 3,
            ResolveError::TransientTransport { .. } => 2,
            ResolveError::ResolutionFailed { cause, .. } => cause.specificity(),
            ResolveError::Bridge(_) => 1,
        }
    }

    /// Returns `true` if this failure came from cancellation rather than a
    /// genuine upstream problem.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ResolveError::Bridge(BridgeError::Cancelled))
    }
}

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn specificity_prefers_manifest_over_transport() {
        let unavailable = ResolveError::ManifestUnavailable {
            detail: "gone".into(),
        };
        let transport = ResolveError::TransientTransport {
            status: Some(503),
            detail: "upstream".into(),
        };
        assert!(unavailable.specificity() > transport.specificity());
    }

    #[test]
    fn resolution_failed_inherits_cause_specificity() {
        let terminal = ResolveError::ResolutionFailed {
            track: "42".into(),
            cause: Box::new(ResolveError::SegmentFetch {
                url: "http://cdn/seg1.mp4".into(),
                detail: "503".into(),
            }),
        };
        assert_eq!(terminal.specificity(), 6);
    }
}

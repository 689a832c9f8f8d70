//! # Quality Tiers and Degradation Policy
//!
//! The upstream service offers a totally ordered set of audio fidelity
//! levels. The policy here decides which tiers a resolution attempts, and in
//! what order, when the requested tier is not available.

use serde::{Deserialize, Serialize};

/// Audio quality tier, ordered from lowest to highest fidelity.
///
/// The serde names match the upstream wire contract
/// (`LOW`, `HIGH`, `LOSSLESS`, `HI_RES_LOSSLESS`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Low,
    High,
    Lossless,
    HiResLossless,
}

impl Quality {
    /// Returns `true` for the hi-res tier, which gets the segmented-manifest
    /// handling in the orchestrator.
    pub fn is_hi_res(&self) -> bool {
        matches!(self, Quality::HiResLossless)
    }

    /// Returns `true` for tiers that deliver lossless audio.
    pub fn is_lossless(&self) -> bool {
        matches!(self, Quality::Lossless | Quality::HiResLossless)
    }
}

impl std::fmt::Display for Quality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Quality::Low => "LOW",
            Quality::High => "HIGH",
            Quality::Lossless => "LOSSLESS",
            Quality::HiResLossless => "HI_RES_LOSSLESS",
        };
        f.write_str(name)
    }
}

/// Ordered list of tiers to attempt for a request.
///
/// The requested tier is first clamped down to the track's known capability,
/// then expanded:
/// - `HiResLossless` → `[HiResLossless, Lossless]`
/// - `Lossless` → `[Lossless]`
/// - anything else → `[requested, Lossless]`
///
/// The result is always non-empty and duplicate-free, and its first element
/// never exceeds the requested tier.
pub fn fallback_chain(requested: Quality, capability: Option<Quality>) -> Vec<Quality> {
    let effective = match capability {
        Some(cap) => requested.min(cap),
        None => requested,
    };

    match effective {
        Quality::HiResLossless => vec![Quality::HiResLossless, Quality::Lossless],
        Quality::Lossless => vec![Quality::Lossless],
        other => vec![other, Quality::Lossless],
    }
}

//! Umbrella crate for the hi-fi stream resolution core.
//!
//! Re-exports the resolution engine together with the bridge layer so hosts
//! depend on one crate. The `desktop-shims` feature (on by default) pulls in
//! the reqwest-backed HTTP bridge; disable it when supplying your own
//! [`bridge_traits::http::HttpClient`] implementation.

pub use bridge_traits;
pub use core_resolve;

#[cfg(feature = "desktop-shims")]
pub use bridge_desktop;

pub use core_resolve::{
    Quality, ResolutionEngine, ResolveConfig, ResolveError, ResolveOutcome, ResolveState,
    TrackRef,
};

//! # Manifest Classifier/Decoder
//!
//! The upstream delivers manifests in inconsistent encodings: base64 with or
//! without padding, URL-safe alphabets, or already-plain text; the decoded
//! body is either a JSON URL list or an adaptive (MPD/DASH) document.
//!
//! Classification follows a closed, ordered decision table rather than
//! open-ended shape scanning:
//! 1. JSON object with a `urls` string array → direct sources
//! 2. XML/MPD prefix or an XML/DASH content type → adaptive manifest
//! 3. One more JSON parse of the raw (undecoded) payload → direct sources
//! 4. Otherwise the payload is unparsable
//!
//! A JSON body whose `detail` equals the upstream "not found" message fails
//! immediately as unavailable and is never misread as an empty URL list.

use crate::error::{ResolveError, Result};
use crate::model::{DecodedManifest, ManifestPayload};
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use serde::Deserialize;
use tracing::debug;

/// Upstream detail string for a missing manifest.
const MANIFEST_NOT_FOUND_DETAIL: &str = "Manifest not found";

/// JSON shape of a direct-sources manifest (and of upstream error bodies).
#[derive(Debug, Deserialize)]
struct JsonManifest {
    #[serde(default)]
    urls: Option<Vec<String>>,
    #[serde(default)]
    detail: Option<String>,
}

/// Decode a manifest payload, tolerating missing padding and URL-safe
/// variants. A payload that fails every base64 engine is treated as
/// already-plain text.
pub fn decode_payload(text: &str) -> String {
    let trimmed = text.trim();

    for engine in [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD] {
        if let Ok(bytes) = engine.decode(trimmed) {
            if let Ok(decoded) = String::from_utf8(bytes) {
                return decoded;
            }
        }
    }

    debug!("manifest payload is not base64, treating as plain text");
    text.to_string()
}

/// Decode and classify a manifest payload.
///
/// # Errors
///
/// - [`ResolveError::ManifestUnavailable`] for the explicit upstream
///   not-found body.
/// - [`ResolveError::ManifestUnparsable`] when no rule of the decision table
///   matches.
pub fn classify(payload: &ManifestPayload) -> Result<DecodedManifest> {
    let decoded = decode_payload(&payload.text);

    // Rule 1: JSON with a URL list. The not-found body is JSON too, so it is
    // intercepted here before it could read as an empty list.
    if let Ok(json) = serde_json::from_str::<JsonManifest>(&decoded) {
        if let Some(direct) = direct_from_json(json, &payload.mime_type)? {
            return Ok(direct);
        }
    }

    // Rule 2: adaptive manifest, by document prefix or declared content type.
    let trimmed = decoded.trim_start();
    if trimmed.starts_with("<?xml") || trimmed.starts_with("<MPD") || mime_is_xml(&payload.mime_type)
    {
        return Ok(DecodedManifest::Adaptive {
            text: decoded,
            mime_type: payload.mime_type.clone(),
        });
    }

    // Rule 3: one more JSON attempt against the raw payload, for upstreams
    // that deliver the JSON body without any encoding.
    if let Ok(json) = serde_json::from_str::<JsonManifest>(payload.text.trim()) {
        if let Some(direct) = direct_from_json(json, &payload.mime_type)? {
            return Ok(direct);
        }
    }

    Err(ResolveError::ManifestUnparsable {
        detail: format!(
            "payload with content type {} matched no manifest encoding",
            payload.mime_type
        ),
    })
}

fn direct_from_json(
    json: JsonManifest,
    mime_type: &str,
) -> Result<Option<DecodedManifest>> {
    if json.detail.as_deref() == Some(MANIFEST_NOT_FOUND_DETAIL) {
        return Err(ResolveError::ManifestUnavailable {
            detail: MANIFEST_NOT_FOUND_DETAIL.to_string(),
        });
    }

    match json.urls {
        Some(urls) if !urls.is_empty() => Ok(Some(DecodedManifest::Direct {
            urls,
            mime_type: mime_type.to_string(),
        })),
        _ => Ok(None),
    }
}

fn mime_is_xml(mime_type: &str) -> bool {
    let lower = mime_type.to_ascii_lowercase();
    lower.contains("dash+xml") || lower.contains("mpd") || lower.contains("xml")
}

//! Regular-expression manifest query.
//!
//! Fallback for environments without a DOM-capable XML stack. Extracts the
//! same per-representation data as the DOM walk via attribute and element
//! patterns; equivalent to [`DomManifestQuery`](super::DomManifestQuery) for
//! well-formed input.

use super::{select_segment_template, select_single_file, ManifestQuery, RawTemplate, Representation};
use crate::error::Result;
use crate::model::{SegmentTemplate, TimelineEntry};
use regex::Regex;

pub struct RegexManifestQuery {
    representation_block: Regex,
    codecs: Regex,
    initialization: Regex,
    media: Regex,
    start_number: Regex,
    timeline_entry: Regex,
    base_url: Regex,
}

impl RegexManifestQuery {
    pub fn new() -> Self {
        // Literal patterns over a known grammar; compilation cannot fail.
        Self {
            representation_block: Regex::new(
                r"(?s)<Representation\b([^>]*?)(?:/>|>(.*?)</Representation>)",
            )
            .unwrap(),
            codecs: Regex::new(r#"codecs="([^"]*)""#).unwrap(),
            initialization: Regex::new(r#"initialization="([^"]+)""#).unwrap(),
            media: Regex::new(r#"media="([^"]+)""#).unwrap(),
            start_number: Regex::new(r#"startNumber="(\d+)""#).unwrap(),
            timeline_entry: Regex::new(r#"<S\b([^>/]*)/?>"#).unwrap(),
            base_url: Regex::new(r"(?s)<BaseURL[^>]*>\s*(.*?)\s*</BaseURL>").unwrap(),
        }
    }

    fn parse_document(&self, mpd: &str) -> Vec<Representation> {
        let mut representations: Vec<Representation> = self
            .representation_block
            .captures_iter(mpd)
            .map(|caps| {
                let attrs = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                // Self-closing representations have no body.
                let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
                self.parse_block(Some(attrs), body)
            })
            .collect();

        if representations.is_empty() {
            // No Representation elements; read the whole document as one.
            let rep = self.parse_block(None, mpd);
            if rep != Representation::default() {
                representations.push(rep);
            }
        }
        representations
    }

    fn parse_block(&self, attrs: Option<&str>, body: &str) -> Representation {
        let codecs = attrs.and_then(|a| {
            self.codecs
                .captures(a)
                .map(|caps| decode_entities(&caps[1]))
        });

        let initialization = self
            .initialization
            .captures(body)
            .map(|caps| decode_entities(&caps[1]));
        let media = self.media.captures(body).map(|caps| decode_entities(&caps[1]));
        let start_number = self
            .start_number
            .captures(body)
            .and_then(|caps| caps[1].parse().ok());

        let timeline: Vec<TimelineEntry> = self
            .timeline_entry
            .captures_iter(body)
            .map(|caps| TimelineEntry {
                duration_units: attr_value(&caps[1], 'd')
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
                repeat: attr_value(&caps[1], 'r')
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            })
            .collect();

        let template = if initialization.is_some() || media.is_some() || !timeline.is_empty() {
            Some(RawTemplate {
                initialization,
                media,
                start_number,
                timeline,
            })
        } else {
            None
        };

        let base_urls = self
            .base_url
            .captures_iter(body)
            .map(|caps| decode_entities(&caps[1]))
            .collect();

        Representation {
            codecs,
            base_urls,
            template,
        }
    }
}

impl Default for RegexManifestQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestQuery for RegexManifestQuery {
    fn segment_template(&self, mpd: &str) -> Result<Option<SegmentTemplate>> {
        let representations = self.parse_document(mpd);
        select_segment_template(&representations)
    }

    fn single_file_url(&self, mpd: &str) -> Option<String> {
        let representations = self.parse_document(mpd);
        select_single_file(&representations)
    }
}

fn decode_entities(value: &str) -> String {
    value.replace("&amp;", "&")
}

/// Pull an attribute value like `d="176128"` out of a raw attribute string.
/// Callers parse into the target width; an out-of-range value reads as
/// absent, matching the DOM walk.
fn attr_value<'a>(attrs: &'a str, name: char) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = attrs.find(&needle)? + needle.len();
    let rest = &attrs[start..];
    let end = rest.find('"')?;
    Some(&rest[..end])
}

//! DOM-capable manifest query built on `quick-xml`.
//!
//! Walks the document event stream once, collecting per-representation
//! segment templates, timelines, and BaseURL values. Attribute values are
//! entity-decoded (`&amp;` shows up in signed CDN URLs).

use super::{select_segment_template, select_single_file, ManifestQuery, RawTemplate, Representation};
use crate::error::{ResolveError, Result};
use crate::model::{SegmentTemplate, TimelineEntry};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::trace;

#[derive(Debug, Default)]
pub struct DomManifestQuery;

impl DomManifestQuery {
    pub fn new() -> Self {
        Self
    }
}

impl ManifestQuery for DomManifestQuery {
    fn segment_template(&self, mpd: &str) -> Result<Option<SegmentTemplate>> {
        let representations = parse_document(mpd)?;
        select_segment_template(&representations)
    }

    fn single_file_url(&self, mpd: &str) -> Option<String> {
        let representations = parse_document(mpd).ok()?;
        select_single_file(&representations)
    }
}

/// Collector state while walking the event stream.
#[derive(Default)]
struct DocumentWalk {
    /// Finished representations, in document order.
    representations: Vec<Representation>,
    /// Representation currently open, if any.
    current: Option<Representation>,
    /// Catch-all for templates and BaseURLs declared outside any
    /// Representation element (adaptation-set or document level).
    document_level: Representation,
    in_timeline: bool,
    in_base_url: bool,
}

impl DocumentWalk {
    fn active(&mut self) -> &mut Representation {
        self.current.as_mut().unwrap_or(&mut self.document_level)
    }

    fn open_representation(&mut self, element: &BytesStart<'_>) {
        let codecs = attribute(element, b"codecs");
        self.current = Some(Representation {
            codecs,
            ..Representation::default()
        });
    }

    fn close_representation(&mut self) {
        if let Some(rep) = self.current.take() {
            self.representations.push(rep);
        }
    }

    fn open_template(&mut self, element: &BytesStart<'_>) {
        let template = RawTemplate {
            initialization: attribute(element, b"initialization"),
            media: attribute(element, b"media"),
            start_number: attribute(element, b"startNumber").and_then(|v| v.parse().ok()),
            timeline: Vec::new(),
        };
        self.active().template = Some(template);
    }

    fn push_timeline_entry(&mut self, element: &BytesStart<'_>) {
        if !self.in_timeline {
            return;
        }
        let duration_units = attribute(element, b"d")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let repeat = attribute(element, b"r")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let entry = TimelineEntry {
            duration_units,
            repeat,
        };
        // S outside any SegmentTemplate has nothing to attach to.
        if let Some(template) = self.active().template.as_mut() {
            template.timeline.push(entry);
        }
    }

    fn push_base_url(&mut self, text: String) {
        let trimmed = text.trim();
        if !trimmed.is_empty() {
            let url = trimmed.replace("&amp;", "&");
            self.active().base_urls.push(url);
        }
    }

    fn finish(mut self) -> Vec<Representation> {
        self.close_representation();
        if self.document_level != Representation::default() {
            self.representations.push(self.document_level);
        }
        self.representations
    }
}

fn parse_document(mpd: &str) -> Result<Vec<Representation>> {
    let mut reader = Reader::from_str(mpd);
    reader.config_mut().trim_text(true);

    let mut walk = DocumentWalk::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => match e.local_name().as_ref() {
                b"Representation" => walk.open_representation(e),
                b"SegmentTemplate" => walk.open_template(e),
                b"SegmentTimeline" => walk.in_timeline = true,
                b"S" => walk.push_timeline_entry(e),
                b"BaseURL" => walk.in_base_url = true,
                _ => {}
            },
            Ok(Event::Empty(ref e)) => match e.local_name().as_ref() {
                b"Representation" => {
                    walk.open_representation(e);
                    walk.close_representation();
                }
                b"SegmentTemplate" => walk.open_template(e),
                b"S" => walk.push_timeline_entry(e),
                _ => {}
            },
            Ok(Event::End(ref e)) => match e.local_name().as_ref() {
                b"Representation" => walk.close_representation(),
                b"SegmentTimeline" => walk.in_timeline = false,
                b"BaseURL" => walk.in_base_url = false,
                _ => {}
            },
            Ok(Event::Text(ref e)) if walk.in_base_url => {
                let text = String::from_utf8_lossy(e.as_ref()).into_owned();
                walk.push_base_url(text);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ResolveError::ManifestUnparsable {
                    detail: format!("malformed manifest XML: {e}"),
                });
            }
        }
        buf.clear();
    }

    let representations = walk.finish();
    trace!(count = representations.len(), "parsed manifest representations");
    Ok(representations)
}

/// Read one attribute, entity-decoding ampersands.
fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    element.attributes().flatten().find_map(|attr| {
        if attr.key.local_name().as_ref() == name {
            let value = String::from_utf8_lossy(&attr.value).replace("&amp;", "&");
            Some(value)
        } else {
            None
        }
    })
}

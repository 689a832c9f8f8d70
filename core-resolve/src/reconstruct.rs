//! # Segment Reconstruction
//!
//! Expands a segment template into its full ordered URL list and downloads
//! every part into one contiguous buffer: initialization segment first, then
//! every media segment in timeline order.
//!
//! Reconstruction is all-or-nothing. Any segment failure aborts the whole
//! operation and the partial buffer is dropped; callers never observe a
//! truncated asset.

use crate::error::{ResolveError, Result};
use crate::model::{ProgressCallback, ProgressStage, ProgressUpdate, SegmentTemplate};
use bridge_traits::error::BridgeError;
use bridge_traits::http::HttpClient;
use bytes::{Bytes, BytesMut};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};
use url::Url;

/// Numeric placeholder in media URL templates.
const NUMBER_PLACEHOLDER: &str = "$Number$";

/// FLAC stream marker, used to pick the buffer's content type.
const FLAC_MAGIC: &[u8; 4] = b"fLaC";

/// Expand a template into the ordered download list: the initialization URL
/// followed by one media URL per timeline segment.
///
/// An empty timeline still expands to one implicit media segment. Numbers are
/// consecutive from `start_number` across entry boundaries.
///
/// # Errors
///
/// [`ResolveError::ManifestUnparsable`] when a template URL is relative and
/// no base URL is available to resolve it against.
pub fn expand_segment_urls(template: &SegmentTemplate) -> Result<Vec<String>> {
    let count = template.media_segment_count();
    let mut urls = Vec::with_capacity(count as usize + 1);

    urls.push(resolve_url(
        template.base_url.as_deref(),
        &template.init_url_template,
    )?);

    for offset in 0..count {
        let number = template.start_number + offset;
        let media = template
            .media_url_template
            .replace(NUMBER_PLACEHOLDER, &number.to_string());
        urls.push(resolve_url(template.base_url.as_deref(), &media)?);
    }

    Ok(urls)
}

fn resolve_url(base: Option<&str>, target: &str) -> Result<String> {
    if target.starts_with("http://") || target.starts_with("https://") {
        return Ok(target.to_string());
    }
    let Some(base) = base else {
        return Err(ResolveError::ManifestUnparsable {
            detail: format!("relative segment URL {target} without a base URL"),
        });
    };
    let joined = Url::parse(base)
        .and_then(|b| b.join(target))
        .map_err(|e| ResolveError::ManifestUnparsable {
            detail: format!("segment URL {target} does not resolve against {base}: {e}"),
        })?;
    Ok(joined.into())
}

/// Downloads segmented and single-URL assets into contiguous buffers.
pub struct SegmentReconstructor {
    http: Arc<dyn HttpClient>,
}

impl SegmentReconstructor {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Download every segment of `template` in order into one buffer.
    ///
    /// Returns the assembled bytes and their sniffed content type.
    ///
    /// # Errors
    ///
    /// [`ResolveError::SegmentFetch`] naming the failing URL; the buffer
    /// assembled so far is discarded.
    #[instrument(skip_all, fields(segments))]
    pub async fn reconstruct(
        &self,
        template: &SegmentTemplate,
        cancel: Option<&CancellationToken>,
        progress: Option<&ProgressCallback>,
    ) -> Result<(Bytes, String)> {
        let urls = expand_segment_urls(template)?;
        tracing::Span::current().record("segments", urls.len());

        let mut buffer = BytesMut::new();
        let total = urls.len();
        for (index, url) in urls.iter().enumerate() {
            let response = self
                .http
                .fetch_bytes(url, cancel)
                .await
                .map_err(|e| match e {
                    BridgeError::Cancelled => ResolveError::Bridge(BridgeError::Cancelled),
                    e => ResolveError::SegmentFetch {
                        url: url.clone(),
                        detail: e.to_string(),
                    },
                })?;
            buffer.extend_from_slice(&response.body);

            if let Some(callback) = progress {
                callback(ProgressUpdate {
                    stage: ProgressStage::Reconstructing,
                    received_bytes: buffer.len() as u64,
                    total_bytes: None,
                });
            }
            debug!(segment = index + 1, total, bytes = buffer.len(), "segment appended");
        }

        let data = buffer.freeze();
        let mime_type = sniff_mime(&data);
        Ok((data, mime_type))
    }

    /// Download one URL in full, for direct-source export.
    ///
    /// # Errors
    ///
    /// [`ResolveError::SegmentFetch`] naming the URL.
    pub async fn download(
        &self,
        url: &str,
        cancel: Option<&CancellationToken>,
        progress: Option<&ProgressCallback>,
    ) -> Result<(Bytes, String)> {
        let response = self
            .http
            .fetch_bytes(url, cancel)
            .await
            .map_err(|e| match e {
                BridgeError::Cancelled => ResolveError::Bridge(BridgeError::Cancelled),
                e => ResolveError::SegmentFetch {
                    url: url.to_string(),
                    detail: e.to_string(),
                },
            })?;

        if let Some(callback) = progress {
            callback(ProgressUpdate {
                stage: ProgressStage::Downloading,
                received_bytes: response.body.len() as u64,
                total_bytes: response.content_length(),
            });
        }

        let mime_type = response
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| sniff_mime(&response.body));
        Ok((response.body, mime_type))
    }
}

/// Content type of an assembled buffer: bare FLAC streams carry the `fLaC`
/// marker; everything else from this upstream is an MP4 container.
fn sniff_mime(data: &[u8]) -> String {
    if data.len() >= FLAC_MAGIC.len() && &data[..FLAC_MAGIC.len()] == FLAC_MAGIC {
        "audio/flac".to_string()
    } else {
        "audio/mp4".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimelineEntry;
    use async_trait::async_trait;
    use bridge_traits::error::BridgeError;
    use bridge_traits::http::{HttpRequest, HttpResponse};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn template(timeline: Vec<TimelineEntry>) -> SegmentTemplate {
        SegmentTemplate {
            init_url_template: "https://cdn.example.com/init.mp4".into(),
            media_url_template: "https://cdn.example.com/seg_$Number$.mp4".into(),
            start_number: 1,
            timeline,
            base_url: None,
            codec_hint: Some("flac".into()),
        }
    }

    #[test]
    fn init_comes_first_then_numbered_media() {
        let urls = expand_segment_urls(&template(vec![
            TimelineEntry {
                duration_units: 1000,
                repeat: 1,
            },
            TimelineEntry {
                duration_units: 500,
                repeat: 0,
            },
        ]))
        .unwrap();

        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/init.mp4",
                "https://cdn.example.com/seg_1.mp4",
                "https://cdn.example.com/seg_2.mp4",
                "https://cdn.example.com/seg_3.mp4",
            ]
        );
    }

    #[test]
    fn empty_timeline_expands_to_one_media_segment() {
        let urls = expand_segment_urls(&template(vec![])).unwrap();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1], "https://cdn.example.com/seg_1.mp4");
    }

    #[test]
    fn start_number_offsets_the_sequence() {
        let mut t = template(vec![TimelineEntry {
            duration_units: 1000,
            repeat: 0,
        }]);
        t.start_number = 7;
        let urls = expand_segment_urls(&t).unwrap();
        assert_eq!(urls[1], "https://cdn.example.com/seg_7.mp4");
    }

    #[test]
    fn relative_urls_resolve_against_base() {
        let mut t = template(vec![]);
        t.init_url_template = "init.mp4".into();
        t.media_url_template = "seg_$Number$.mp4".into();
        t.base_url = Some("https://cdn.example.com/tracks/42/".into());
        let urls = expand_segment_urls(&t).unwrap();
        assert_eq!(urls[0], "https://cdn.example.com/tracks/42/init.mp4");
        assert_eq!(urls[1], "https://cdn.example.com/tracks/42/seg_1.mp4");
    }

    #[test]
    fn relative_url_without_base_is_unparsable() {
        let mut t = template(vec![]);
        t.init_url_template = "init.mp4".into();
        let err = expand_segment_urls(&t).unwrap_err();
        assert!(matches!(err, ResolveError::ManifestUnparsable { .. }));
    }

    #[test]
    fn flac_magic_is_sniffed() {
        assert_eq!(sniff_mime(b"fLaC\x00\x00\x00\x22"), "audio/flac");
        assert_eq!(sniff_mime(b"\x00\x00\x00\x20ftypM4A "), "audio/mp4");
        assert_eq!(sniff_mime(b"fL"), "audio/mp4");
    }

    /// HTTP client serving canned bodies per URL, recording fetch order.
    struct CannedHttp {
        bodies: HashMap<String, Bytes>,
        fail_on: Option<String>,
        fetched: Mutex<Vec<String>>,
    }

    impl CannedHttp {
        fn new(bodies: &[(&str, &[u8])]) -> Self {
            Self {
                bodies: bodies
                    .iter()
                    .map(|(url, body)| (url.to_string(), Bytes::copy_from_slice(body)))
                    .collect(),
                fail_on: None,
                fetched: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, url: &str) -> Self {
            self.fail_on = Some(url.to_string());
            self
        }
    }

    #[async_trait]
    impl HttpClient for CannedHttp {
        async fn execute(
            &self,
            request: HttpRequest,
        ) -> std::result::Result<HttpResponse, BridgeError> {
            self.fetched.lock().unwrap().push(request.url.clone());
            if self.fail_on.as_deref() == Some(request.url.as_str()) {
                return Err(BridgeError::HttpStatus {
                    status: 500,
                    detail: "segment store exploded".into(),
                });
            }
            let body = self
                .bodies
                .get(&request.url)
                .cloned()
                .ok_or_else(|| BridgeError::NotAvailable(request.url.clone()))?;
            Ok(HttpResponse {
                status: 200,
                headers: HashMap::new(),
                body,
            })
        }
    }

    #[tokio::test]
    async fn reconstruction_concatenates_in_order() {
        let http = Arc::new(CannedHttp::new(&[
            ("https://cdn.example.com/init.mp4", b"fLaC"),
            ("https://cdn.example.com/seg_1.mp4", b"AAAA"),
            ("https://cdn.example.com/seg_2.mp4", b"BBBB"),
        ]));
        let reconstructor = SegmentReconstructor::new(http.clone());
        let t = template(vec![TimelineEntry {
            duration_units: 1000,
            repeat: 1,
        }]);

        let (data, mime_type) = reconstructor.reconstruct(&t, None, None).await.unwrap();

        assert_eq!(&data[..], b"fLaCAAAABBBB");
        assert_eq!(mime_type, "audio/flac");
        assert_eq!(
            *http.fetched.lock().unwrap(),
            vec![
                "https://cdn.example.com/init.mp4",
                "https://cdn.example.com/seg_1.mp4",
                "https://cdn.example.com/seg_2.mp4",
            ]
        );
    }

    #[tokio::test]
    async fn failed_segment_aborts_whole_reconstruction() {
        let http = Arc::new(
            CannedHttp::new(&[
                ("https://cdn.example.com/init.mp4", b"fLaC"),
                ("https://cdn.example.com/seg_1.mp4", b"AAAA"),
            ])
            .failing_on("https://cdn.example.com/seg_2.mp4"),
        );
        let reconstructor = SegmentReconstructor::new(http);
        let t = template(vec![TimelineEntry {
            duration_units: 1000,
            repeat: 1,
        }]);

        let err = reconstructor.reconstruct(&t, None, None).await.unwrap_err();

        match err {
            ResolveError::SegmentFetch { url, .. } => {
                assert_eq!(url, "https://cdn.example.com/seg_2.mp4");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn progress_is_reported_per_segment() {
        let http = Arc::new(CannedHttp::new(&[
            ("https://cdn.example.com/init.mp4", b"fLaC"),
            ("https://cdn.example.com/seg_1.mp4", b"AAAA"),
        ]));
        let reconstructor = SegmentReconstructor::new(http);
        let t = template(vec![]);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_callback = seen.clone();
        let callback: ProgressCallback = Arc::new(move |update| {
            seen_in_callback.lock().unwrap().push(update.received_bytes);
        });

        reconstructor
            .reconstruct(&t, None, Some(&callback))
            .await
            .unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![4, 8]);
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_fetching() {
        let http = Arc::new(CannedHttp::new(&[(
            "https://cdn.example.com/init.mp4",
            b"fLaC".as_slice(),
        )]));
        let reconstructor = SegmentReconstructor::new(http.clone());
        let token = CancellationToken::new();
        token.cancel();

        let err = reconstructor
            .reconstruct(&template(vec![]), Some(&token), None)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(http.fetched.lock().unwrap().is_empty());
    }
}

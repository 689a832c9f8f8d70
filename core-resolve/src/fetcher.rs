//! # Track Info Fetcher
//!
//! Resilient wrapper around the upstream playback-info call.
//!
//! Two independent recovery mechanisms:
//! - 429/5xx/transport failures retry up to the policy budget with
//!   increasing delay.
//! - A 401 carrying the invalid/expired-token sub-status gets exactly one
//!   refresh-then-retry, outside the backoff budget.
//!
//! The fetcher has no cache or ticket side effects; it only talks to the
//! provider and the refresher.

use crate::error::{ResolveError, Result};
use crate::provider::{PlaybackInfo, ProviderError, SessionRefresher, TrackInfoProvider};
use crate::quality::Quality;
use crate::model::TrackId;
use bridge_traits::http::RetryPolicy;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Resilient "get manifest info at tier X" caller.
pub struct TrackInfoFetcher {
    provider: Arc<dyn TrackInfoProvider>,
    refresher: Option<Arc<dyn SessionRefresher>>,
    policy: RetryPolicy,
}

impl TrackInfoFetcher {
    pub fn new(provider: Arc<dyn TrackInfoProvider>, policy: RetryPolicy) -> Self {
        Self {
            provider,
            refresher: None,
            policy,
        }
    }

    /// Attach a session refresher for the single 401 recovery retry.
    pub fn with_refresher(mut self, refresher: Arc<dyn SessionRefresher>) -> Self {
        self.refresher = Some(refresher);
        self
    }

    /// Fetch playback info for `track` at `quality`, retrying per policy.
    ///
    /// # Errors
    ///
    /// - [`ResolveError::TransientTransport`] once the retry budget is
    ///   exhausted, naming the last status and detail.
    /// - [`ResolveError::AuthExpired`] when a token-expired 401 could not be
    ///   recovered by the one refresh retry.
    /// - [`ResolveError::ManifestUnavailable`] for a plain upstream 404.
    pub async fn playback_info(&self, track: &TrackId, quality: Quality) -> Result<PlaybackInfo> {
        let mut attempt: u32 = 0;
        let mut refresh_used = false;
        let mut last_error: Option<ResolveError> = None;

        while attempt < self.policy.max_attempts {
            match self.provider.playback_info(track, quality).await {
                Ok(info) => {
                    debug!(%track, %quality, attempt, "playback info fetched");
                    return Ok(info);
                }
                Err(e) if e.is_token_expired() && !refresh_used => {
                    refresh_used = true;
                    match self.try_refresh().await {
                        Ok(()) => {
                            debug!(%track, "session refreshed, retrying playback info");
                            // One extra attempt, independent of the backoff
                            // budget: the attempt counter is left untouched.
                            continue;
                        }
                        Err(refresh_err) => {
                            warn!(%track, error = %refresh_err, "session refresh failed");
                            return Err(ResolveError::AuthExpired {
                                detail: refresh_err.detail,
                            });
                        }
                    }
                }
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    warn!(
                        %track,
                        %quality,
                        attempt,
                        status = ?e.status,
                        detail = %e.detail,
                        "retryable playback info failure"
                    );
                    last_error = Some(ResolveError::TransientTransport {
                        status: e.status,
                        detail: e.detail,
                    });
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.delay_for(attempt);
                        debug!(delay_ms = delay.as_millis() as u64, "backing off");
                        sleep(delay).await;
                    }
                }
                Err(e) => return Err(Self::map_terminal(e)),
            }
        }

        Err(last_error.unwrap_or_else(|| ResolveError::TransientTransport {
            status: None,
            detail: "retry budget exhausted".to_string(),
        }))
    }

    async fn try_refresh(&self) -> std::result::Result<(), ProviderError> {
        match &self.refresher {
            Some(refresher) => refresher.refresh_session().await,
            None => Err(ProviderError::transport("no session refresher configured")),
        }
    }

    fn map_terminal(e: ProviderError) -> ResolveError {
        if e.is_not_found() {
            ResolveError::ManifestUnavailable { detail: e.detail }
        } else if e.status == Some(401) {
            ResolveError::AuthExpired { detail: e.detail }
        } else {
            ResolveError::TransientTransport {
                status: e.status,
                detail: e.detail,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn info() -> PlaybackInfo {
        PlaybackInfo {
            manifest: "e30=".into(),
            manifest_mime_type: "application/json".into(),
            direct_url: None,
            sample_rate_hz: Some(44100),
            bit_depth: Some(16),
            replay_gain_db: None,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }

    /// Scripted provider: fails with the queued errors, then succeeds.
    struct ScriptedProvider {
        failures: Vec<ProviderError>,
        calls: AtomicU32,
    }

    impl ScriptedProvider {
        fn new(failures: Vec<ProviderError>) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TrackInfoProvider for ScriptedProvider {
        async fn playback_info(
            &self,
            _track: &TrackId,
            _quality: Quality,
        ) -> std::result::Result<PlaybackInfo, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            match self.failures.get(call) {
                Some(err) => Err(err.clone()),
                None => Ok(info()),
            }
        }
    }

    struct CountingRefresher {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl SessionRefresher for CountingRefresher {
        async fn refresh_session(&self) -> std::result::Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ProviderError::http(401, "refresh rejected"))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn three_429s_then_success_with_increasing_delay() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderError::http(429, "rate limited"),
            ProviderError::http(429, "rate limited"),
            ProviderError::http(429, "rate limited"),
        ]));
        let fetcher = TrackInfoFetcher::new(provider.clone(), policy());

        let started = tokio::time::Instant::now();
        let result = fetcher
            .playback_info(&TrackId::new("1"), Quality::Lossless)
            .await;

        assert!(result.is_ok());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 4);
        // 500ms + 1s + 2s of backoff, doubling each retry.
        assert_eq!(started.elapsed(), Duration::from_millis(3500));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_surfaces_last_status() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            ProviderError::http(500, "boom"),
            ProviderError::http(502, "bad gateway"),
            ProviderError::http(503, "unavailable"),
            ProviderError::http(504, "timeout"),
        ]));
        let fetcher = TrackInfoFetcher::new(provider, policy());

        let err = fetcher
            .playback_info(&TrackId::new("1"), Quality::High)
            .await
            .unwrap_err();

        match err {
            ResolveError::TransientTransport { status, detail } => {
                assert_eq!(status, Some(504));
                assert_eq!(detail, "timeout");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn token_expiry_gets_exactly_one_refresh_retry() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderError::http(
            401,
            "token expired",
        )
        .with_sub_status(crate::provider::SUB_STATUS_TOKEN_EXPIRED)]));
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let fetcher =
            TrackInfoFetcher::new(provider.clone(), policy()).with_refresher(refresher.clone());

        let result = fetcher
            .playback_info(&TrackId::new("1"), Quality::Lossless)
            .await;

        assert!(result.is_ok());
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_token_expiry_is_terminal() {
        let expired = ProviderError::http(401, "token expired")
            .with_sub_status(crate::provider::SUB_STATUS_TOKEN_EXPIRED);
        let provider = Arc::new(ScriptedProvider::new(vec![expired.clone(), expired]));
        let refresher = Arc::new(CountingRefresher {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let fetcher =
            TrackInfoFetcher::new(provider, policy()).with_refresher(refresher.clone());

        let err = fetcher
            .playback_info(&TrackId::new("1"), Quality::Lossless)
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::AuthExpired { .. }));
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_maps_to_manifest_unavailable() {
        let provider = Arc::new(ScriptedProvider::new(vec![ProviderError::http(
            404,
            "no manifest at this quality",
        )]));
        let fetcher = TrackInfoFetcher::new(provider, policy());

        let err = fetcher
            .playback_info(&TrackId::new("1"), Quality::HiResLossless)
            .await
            .unwrap_err();

        assert!(matches!(err, ResolveError::ManifestUnavailable { .. }));
    }
}

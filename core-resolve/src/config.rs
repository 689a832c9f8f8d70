//! # Engine Configuration

use bridge_traits::http::RetryPolicy;
use std::time::Duration;
use thiserror::Error;

/// Configuration for the resolution engine.
#[derive(Debug, Clone)]
pub struct ResolveConfig {
    /// Retry policy for upstream playback-info calls.
    pub retry: RetryPolicy,
    /// Remaining playback time at which the next track's preload starts.
    pub preload_threshold: Duration,
}

impl Default for ResolveConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            preload_threshold: Duration::from_secs(12),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("retry.max_attempts must be at least 1")]
    NoAttempts,
    #[error("preload_threshold must be non-zero")]
    ZeroPreloadThreshold,
}

impl ResolveConfig {
    /// Validate the configuration before handing it to the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }
        if self.preload_threshold.is_zero() {
            return Err(ConfigError::ZeroPreloadThreshold);
        }
        Ok(())
    }

    /// Whether `remaining` playback time is inside the preload window.
    pub fn should_preload(&self, remaining: Duration) -> bool {
        remaining <= self.preload_threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(ResolveConfig::default().validate(), Ok(()));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let mut config = ResolveConfig::default();
        config.retry.max_attempts = 0;
        assert_eq!(config.validate(), Err(ConfigError::NoAttempts));
    }

    #[test]
    fn preload_window_boundary() {
        let config = ResolveConfig::default();
        assert!(!config.should_preload(Duration::from_secs(13)));
        assert!(config.should_preload(Duration::from_secs(12)));
        assert!(config.should_preload(Duration::from_secs(3)));
    }
}

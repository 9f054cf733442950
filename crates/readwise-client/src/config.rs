//! Client configuration.

use std::time::Duration;

use readwise_core::defaults::{
    BASE_URL, ENV_BASE_URL, ENV_POLL_INTERVAL_MS, ENV_TIMEOUT_SECS, POLL_INTERVAL_MS,
    REQUEST_TIMEOUT_SECS,
};

/// Configuration for [`crate::ApiClient`] and the job status poller.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend origin, without the `/api` prefix.
    pub base_url: String,
    /// Timeout for plain requests in seconds. Job streams are unbounded.
    pub timeout_seconds: u64,
    /// Interval between status polls in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: BASE_URL.to_string(),
            timeout_seconds: REQUEST_TIMEOUT_SECS,
            poll_interval_ms: POLL_INTERVAL_MS,
        }
    }
}

impl ClientConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `READWISE_BASE_URL` | `http://localhost:8000` | Backend origin |
    /// | `READWISE_TIMEOUT_SECS` | `30` | Timeout for non-streaming requests |
    /// | `READWISE_POLL_INTERVAL_MS` | `1000` | Status poll interval |
    pub fn from_env() -> Self {
        let base_url = std::env::var(ENV_BASE_URL)
            .ok()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| BASE_URL.to_string());

        let timeout_seconds = std::env::var(ENV_TIMEOUT_SECS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(REQUEST_TIMEOUT_SECS);

        let poll_interval_ms = std::env::var(ENV_POLL_INTERVAL_MS)
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(POLL_INTERVAL_MS)
            .max(1);

        Self {
            base_url,
            timeout_seconds,
            poll_interval_ms,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_seconds = secs;
        self
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms.max(1);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.base_url, BASE_URL);
        assert_eq!(config.timeout_seconds, REQUEST_TIMEOUT_SECS);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_builder_setters() {
        let config = ClientConfig::default()
            .with_base_url("http://books.local:9000")
            .with_timeout(5)
            .with_poll_interval(0);
        assert_eq!(config.base_url, "http://books.local:9000");
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
        // zero would spin; clamped to 1ms
        assert_eq!(config.poll_interval_ms, 1);
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Client configuration
//!
//! A `ClientConfig` is built once per client and never mutated by the
//! operations that read it. Leaving `api_url` unset targets the cloud
//! endpoint, which requires an API key.

use std::env;
use std::fmt;
use std::time::Duration;

use url::Url;

use crate::error::VisionError;

/// Default cloud inference endpoint
pub const CLOUD_API_URL: &str = "https://api.moondream.ai/v1";

/// Default per-exchange deadline
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Default number of retries for transient failures
pub const DEFAULT_RETRIES: u32 = 2;

/// Configuration for a vision client
#[derive(Clone, PartialEq)]
pub struct ClientConfig {
    /// Credential sent to the cloud endpoint
    pub api_key: Option<String>,
    /// Local inference server URL; overrides the cloud endpoint
    pub api_url: Option<String>,
    /// Bounds time-to-first-byte and the gap between body chunks
    pub timeout: Duration,
    /// Retry budget for transient failures
    pub retries: u32,
    /// Pause between retries
    pub retry_delay: Duration,
}

impl ClientConfig {
    /// Configuration targeting the cloud endpoint
    pub fn cloud(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Configuration targeting a locally hosted server
    pub fn local(api_url: impl Into<String>) -> Self {
        Self {
            api_url: Some(api_url.into()),
            ..Self::default()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Load configuration from environment variables
    ///
    /// Reads `MOONDREAM_API_KEY`, `MOONDREAM_API_URL`, `MOONDREAM_TIMEOUT_MS`,
    /// `MOONDREAM_RETRIES` and `MOONDREAM_RETRY_DELAY_MS`. Unparseable numbers
    /// fall back to the defaults.
    pub fn from_env() -> Self {
        Self {
            api_key: env::var("MOONDREAM_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            api_url: env::var("MOONDREAM_API_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            timeout: Duration::from_millis(
                env::var("MOONDREAM_TIMEOUT_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_MS),
            ),
            retries: env::var("MOONDREAM_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRIES),
            retry_delay: Duration::from_millis(
                env::var("MOONDREAM_RETRY_DELAY_MS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(0),
            ),
        }
    }

    /// Whether requests go to a locally hosted server
    pub fn is_local(&self) -> bool {
        self.api_url.is_some()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), VisionError> {
        if self.timeout.is_zero() {
            return Err(VisionError::Config(
                "timeout must be greater than 0".to_string(),
            ));
        }

        match &self.api_url {
            Some(api_url) => {
                let url = Url::parse(api_url).map_err(|e| {
                    VisionError::Config(format!("invalid api_url '{}': {}", api_url, e))
                })?;
                if url.scheme() != "http" && url.scheme() != "https" {
                    return Err(VisionError::Config(format!(
                        "api_url must use http or https, got '{}'",
                        url.scheme()
                    )));
                }
            }
            None => {
                let has_key = self
                    .api_key
                    .as_deref()
                    .map(|k| !k.trim().is_empty())
                    .unwrap_or(false);
                if !has_key {
                    return Err(VisionError::Config(
                        "an API key is required for cloud inference".to_string(),
                    ));
                }
            }
        }

        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: None,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::ZERO,
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

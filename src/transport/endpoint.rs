// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Endpoint families
//!
//! A client talks to exactly one endpoint for its whole lifetime. The
//! endpoint decides the base URL and which credentials ride along.

use reqwest::RequestBuilder;
use tracing::info;

use crate::config::{ClientConfig, CLOUD_API_URL};
use crate::error::VisionError;

/// Header carrying the cloud credential
pub const AUTH_HEADER: &str = "X-Moondream-Auth";

/// Trait implemented by every endpoint family
pub trait Endpoint: Send + Sync {
    /// Endpoint name for logging
    fn name(&self) -> &'static str;

    /// Base URL without a trailing slash
    fn base_url(&self) -> &str;

    /// Attach credentials to an outgoing request
    ///
    /// The default attaches nothing.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request
    }

    /// Full URL for an operation path
    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url(), path.trim_start_matches('/'))
    }
}

/// Locally hosted inference server
#[derive(Debug, Clone)]
pub struct LocalEndpoint {
    base_url: String,
}

impl LocalEndpoint {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Endpoint for LocalEndpoint {
    fn name(&self) -> &'static str {
        "local"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Cloud inference endpoint
#[derive(Clone)]
pub struct CloudEndpoint {
    base_url: String,
    api_key: String,
}

impl CloudEndpoint {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            base_url: CLOUD_API_URL.to_string(),
            api_key: api_key.into(),
        }
    }
}

impl Endpoint for CloudEndpoint {
    fn name(&self) -> &'static str {
        "cloud"
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(AUTH_HEADER, &self.api_key)
    }
}

/// Pick the endpoint family for a configuration
///
/// A configured `api_url` always wins; otherwise the cloud endpoint is used
/// with the configured API key.
pub fn select_endpoint(config: &ClientConfig) -> Result<Box<dyn Endpoint>, VisionError> {
    config.validate()?;

    let endpoint: Box<dyn Endpoint> = match (&config.api_url, &config.api_key) {
        (Some(api_url), _) => Box::new(LocalEndpoint::new(api_url)),
        (None, Some(api_key)) => Box::new(CloudEndpoint::new(api_key.clone())),
        (None, None) => {
            return Err(VisionError::Config(
                "an API key is required for cloud inference".to_string(),
            ))
        }
    };

    info!(
        "Vision endpoint selected: {} ({})",
        endpoint.name(),
        endpoint.base_url()
    );
    Ok(endpoint)
}

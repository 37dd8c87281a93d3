// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! HTTP exchange with retries and deadlines

use std::time::{Duration, Instant};

use bytes::Bytes;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::body::BodyStream;
use super::endpoint::{select_endpoint, Endpoint};
use crate::config::ClientConfig;
use crate::decode::buffered::decode_api_error;
use crate::error::{TimeoutPhase, VisionError};
use crate::version;
use crate::vision::request::PreparedRequest;

/// Raw response handed to the decoder
#[derive(Debug)]
pub enum ResponseBody {
    /// Full body, read to completion
    Buffered(Bytes),
    /// Open body, read incrementally by the consumer
    Streaming(BodyStream),
}

/// Performs one logical exchange per request against the selected endpoint
pub struct Dispatcher {
    client: Client,
    endpoint: Box<dyn Endpoint>,
    timeout: Duration,
    retries: u32,
    retry_delay: Duration,
}

impl Dispatcher {
    /// Create a dispatcher for a configuration
    pub fn new(config: &ClientConfig) -> Result<Self, VisionError> {
        let endpoint = select_endpoint(config)?;
        let client = Client::builder()
            .connect_timeout(config.timeout)
            .user_agent(version::user_agent())
            .build()?;

        Ok(Self {
            client,
            endpoint,
            timeout: config.timeout,
            retries: config.retries,
            retry_delay: config.retry_delay,
        })
    }

    /// Name of the selected endpoint family
    pub fn endpoint_name(&self) -> &'static str {
        self.endpoint.name()
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    /// Check if the endpoint answers its health route
    pub async fn health_check(&self) -> bool {
        let request = self
            .endpoint
            .authorize(self.client.get(self.endpoint.url_for("/health")));
        match timeout(self.timeout, request.send()).await {
            Ok(Ok(resp)) => resp.status().is_success(),
            Ok(Err(e)) => {
                debug!("Vision health check failed: {}", e);
                false
            }
            Err(_) => {
                debug!("Vision health check timed out after {:?}", self.timeout);
                false
            }
        }
    }

    /// Send a prepared request, retrying transient failures
    ///
    /// The serialized body is replayed verbatim on every attempt. Retries
    /// only cover the exchange up to the response headers (and the full body
    /// when buffering); a stream handed back to the caller is never replayed.
    /// Body reads are bounded per gap between chunks, not in total.
    pub async fn dispatch(&self, request: &PreparedRequest) -> Result<ResponseBody, VisionError> {
        let url = self.endpoint.url_for(request.operation.path());
        let start = Instant::now();
        let mut attempt = 0;

        loop {
            debug!(
                "Vision {} POST {} (attempt {}, stream={})",
                request.operation,
                url,
                attempt + 1,
                request.stream
            );

            match self.exchange(&url, request.body.clone(), request.stream).await {
                Ok(body) => {
                    debug!(
                        "Vision {} answered in {}ms",
                        request.operation,
                        start.elapsed().as_millis()
                    );
                    return Ok(body);
                }
                Err(e) if e.is_retryable() && attempt < self.retries => {
                    attempt += 1;
                    warn!(
                        "Vision {} failed, retry {}/{}: {}",
                        request.operation, attempt, self.retries, e
                    );
                    if !self.retry_delay.is_zero() {
                        sleep(self.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn exchange(
        &self,
        url: &str,
        payload: Bytes,
        stream: bool,
    ) -> Result<ResponseBody, VisionError> {
        let accept = if stream {
            "text/event-stream"
        } else {
            "application/json"
        };
        let request = self.endpoint.authorize(
            self.client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .header(ACCEPT, accept)
                .body(payload),
        );

        // Dropping the send future on timeout aborts the connection
        let response = match timeout(self.timeout, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(self.classify(e, TimeoutPhase::Connect)),
            Err(_) => {
                return Err(VisionError::Timeout {
                    phase: TimeoutPhase::FirstByte,
                    timeout: self.timeout,
                })
            }
        };

        let status = response.status();
        if !status.is_success() {
            let body = BodyStream::from_response(response, self.timeout)
                .read_to_end()
                .await
                .unwrap_or_default();
            return Err(VisionError::ApiRequest {
                status: status.as_u16(),
                error: decode_api_error(status, &body),
            });
        }

        if stream {
            return Ok(ResponseBody::Streaming(BodyStream::from_response(
                response,
                self.timeout,
            )));
        }

        BodyStream::from_response(response, self.timeout)
            .read_to_end()
            .await
            .map(ResponseBody::Buffered)
    }

    fn classify(&self, error: reqwest::Error, phase: TimeoutPhase) -> VisionError {
        if error.is_timeout() {
            VisionError::Timeout {
                phase,
                timeout: self.timeout,
            }
        } else {
            VisionError::Transport(error)
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("endpoint", &self.endpoint.name())
            .field("base_url", &self.endpoint.base_url())
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .finish()
    }
}

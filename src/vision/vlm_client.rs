// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision-language client for caption, query, detect, point and segment

use std::time::Instant;

use tracing::{debug, info};

use super::request::{
    CaptionRequest, DetectRequest, Operation, PointRequest, PreparedRequest, QueryRequest,
    SegmentRequest,
};
use super::types::{
    CaptionOutput, DetectOutput, PointOutput, QueryOutput, SegmentOutput, TextResult,
};
use crate::config::ClientConfig;
use crate::decode::buffered;
use crate::decode::stream::{SegmentStream, TextStream};
use crate::error::VisionError;
use crate::transport::{Dispatcher, ResponseBody};
use crate::version;

/// Client for a local or cloud vision-language inference endpoint
///
/// Holds no per-call state; share it behind an `Arc` for concurrent use.
#[derive(Debug)]
pub struct VlClient {
    config: ClientConfig,
    dispatcher: Dispatcher,
}

impl VlClient {
    /// Create a new client, validating the configuration
    pub fn new(config: ClientConfig) -> Result<Self, VisionError> {
        let dispatcher = Dispatcher::new(&config)?;
        info!(
            "{} configured: endpoint={}, base_url={}, timeout={:?}, retries={}",
            version::get_version_string(),
            dispatcher.endpoint_name(),
            dispatcher.base_url(),
            config.timeout,
            config.retries
        );
        Ok(Self { config, dispatcher })
    }

    /// Create a client from `MOONDREAM_*` environment variables
    pub fn from_env() -> Result<Self, VisionError> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Name of the selected endpoint family (`local` or `cloud`)
    pub fn endpoint_name(&self) -> &'static str {
        self.dispatcher.endpoint_name()
    }

    /// Check if the endpoint is reachable and healthy
    pub async fn health_check(&self) -> bool {
        self.dispatcher.health_check().await
    }

    /// Caption an image
    pub async fn caption(&self, request: CaptionRequest) -> Result<CaptionOutput, VisionError> {
        let prepared = request.build()?;
        let caption = match self.send(&prepared).await? {
            ResponseBody::Buffered(body) => {
                TextResult::Complete(buffered::decode_caption(&body)?)
            }
            ResponseBody::Streaming(body) => {
                TextResult::Streaming(TextStream::new(Operation::Caption, body))
            }
        };
        Ok(CaptionOutput { caption })
    }

    /// Ask a question about an image
    pub async fn query(&self, request: QueryRequest) -> Result<QueryOutput, VisionError> {
        let prepared = request.build()?;
        let output = match self.send(&prepared).await? {
            ResponseBody::Buffered(body) => {
                let (answer, reasoning) = buffered::decode_query(&body)?;
                QueryOutput {
                    answer: TextResult::Complete(answer),
                    reasoning,
                }
            }
            ResponseBody::Streaming(body) => QueryOutput {
                answer: TextResult::Streaming(TextStream::new(Operation::Query, body)),
                reasoning: None,
            },
        };
        Ok(output)
    }

    /// Locate every instance of an object as bounding boxes
    pub async fn detect(&self, request: DetectRequest) -> Result<DetectOutput, VisionError> {
        let prepared = request.build()?;
        let body = self.buffered(&prepared).await?;
        let objects = buffered::decode_detect(&body)?;
        debug!("Vision detect found {} objects", objects.len());
        Ok(DetectOutput { objects })
    }

    /// Locate every instance of an object as center points
    pub async fn point(&self, request: PointRequest) -> Result<PointOutput, VisionError> {
        let prepared = request.build()?;
        let body = self.buffered(&prepared).await?;
        let points = buffered::decode_point(&body)?;
        debug!("Vision point found {} points", points.len());
        Ok(PointOutput { points })
    }

    /// Produce a segmentation mask for an object
    pub async fn segment(&self, request: SegmentRequest) -> Result<SegmentOutput, VisionError> {
        let prepared = request.build()?;
        let output = match self.send(&prepared).await? {
            ResponseBody::Buffered(body) => {
                SegmentOutput::Complete(buffered::decode_segment(&body)?)
            }
            ResponseBody::Streaming(body) => SegmentOutput::Streaming(SegmentStream::new(body)),
        };
        Ok(output)
    }

    async fn send(&self, prepared: &PreparedRequest) -> Result<ResponseBody, VisionError> {
        let start = Instant::now();
        let response = self.dispatcher.dispatch(prepared).await?;
        debug!(
            "Vision {} response ready in {}ms (streamed={})",
            prepared.operation,
            start.elapsed().as_millis(),
            matches!(response, ResponseBody::Streaming(_))
        );
        Ok(response)
    }

    /// Send an operation that never streams
    async fn buffered(&self, prepared: &PreparedRequest) -> Result<bytes::Bytes, VisionError> {
        match self.send(prepared).await? {
            ResponseBody::Buffered(body) => Ok(body),
            ResponseBody::Streaming(_) => Err(VisionError::Decode {
                context: prepared.operation.as_str(),
                reason: "unexpected streamed response".to_string(),
                excerpt: String::new(),
            }),
        }
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod cli;
pub mod config;
pub mod decode;
pub mod error;
pub mod transport;
pub mod version;
pub mod vision;

// Re-export the main call surface
pub use config::ClientConfig;
pub use decode::{SegmentStream, StreamOutcome, TextStream};
pub use error::{ApiError, TimeoutPhase, VisionError};
pub use vision::{
    BoundingBox, CaptionOutput, CaptionRequest, DetectOutput, DetectRequest, ImageInput, Length,
    Point, PointOutput, PointRequest, QueryAnswer, QueryOutput, QueryRequest, Reasoning,
    ReasoningGrounding, SamplingSettings, SegmentOutput, SegmentRequest, SegmentStreamChunk,
    Segmentation, SpatialRef, TextResult, VlClient,
};

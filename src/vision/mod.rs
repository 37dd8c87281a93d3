// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Vision-language inference over local or cloud endpoints
//!
//! This module provides:
//! - Image normalization into data URIs
//! - Request builders for caption, query, detect, point and segment
//! - The `VlClient` façade returning typed, possibly streamed, results

pub mod image_utils;
pub mod request;
pub mod types;
pub mod vlm_client;

pub use image_utils::{detect_format, normalize, EncodedImage, ImageInput};
pub use request::{
    CaptionRequest, DetectRequest, Length, Operation, PointRequest, QueryRequest,
    SamplingSettings, SegmentRequest, SpatialRef,
};
pub use types::{
    BoundingBox, CaptionOutput, DetectOutput, Point, PointOutput, QueryAnswer, QueryOutput,
    Reasoning, ReasoningGrounding, SegmentOutput, SegmentStreamChunk, Segmentation, TextResult,
};
pub use vlm_client::VlClient;

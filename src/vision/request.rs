// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Operation requests and their wire bodies
//!
//! Each request type applies its defaults, validates its fields and turns
//! itself into a `PreparedRequest`: the serialized JSON body plus the stream
//! flag the transport has to honour. Nothing in this module knows which
//! endpoint the request will be sent to.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::image_utils::{normalize, ImageInput};
use crate::error::VisionError;

/// The five vision operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Caption,
    Query,
    Detect,
    Point,
    Segment,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Caption => "caption",
            Operation::Query => "query",
            Operation::Detect => "detect",
            Operation::Point => "point",
            Operation::Segment => "segment",
        }
    }

    /// Path of the operation relative to the endpoint base URL
    pub fn path(&self) -> &'static str {
        match self {
            Operation::Caption => "/caption",
            Operation::Query => "/query",
            Operation::Detect => "/detect",
            Operation::Point => "/point",
            Operation::Segment => "/segment",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caption length
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Length {
    Short,
    #[default]
    Normal,
    Long,
}

impl FromStr for Length {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "short" => Ok(Length::Short),
            "normal" => Ok(Length::Normal),
            "long" => Ok(Length::Long),
            other => Err(format!(
                "invalid length '{}'; allowed: short, normal, long",
                other
            )),
        }
    }
}

/// Generation controls; absent values fall back to server defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SamplingSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl SamplingSettings {
    pub fn with_max_tokens(max_tokens: u32) -> Self {
        Self {
            max_tokens: Some(max_tokens),
        }
    }

    fn is_empty(&self) -> bool {
        self.max_tokens.is_none()
    }
}

/// Fields shared by every operation request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BaseRequest {
    /// Model variant selector
    pub variant: Option<String>,
    pub settings: Option<SamplingSettings>,
}

impl BaseRequest {
    fn validate(&self) -> Result<(), VisionError> {
        if let Some(variant) = &self.variant {
            if variant.trim().is_empty() {
                return Err(VisionError::validation(
                    "variant",
                    "must not be empty when set",
                ));
            }
        }
        if let Some(SamplingSettings {
            max_tokens: Some(0),
        }) = &self.settings
        {
            return Err(VisionError::validation(
                "settings.max_tokens",
                "must be greater than 0",
            ));
        }
        Ok(())
    }

    fn fields(&self) -> BaseFields<'_> {
        BaseFields {
            variant: self.variant.as_deref(),
            settings: self.settings.as_ref().filter(|s| !s.is_empty()),
        }
    }
}

/// Seed for segmentation: a point `[x, y]` or a box `[x1, y1, x2, y2]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SpatialRef {
    Point([f64; 2]),
    BBox([f64; 4]),
}

impl SpatialRef {
    /// Build from an arbitrary coordinate list, rejecting other arities
    pub fn from_slice(values: &[f64]) -> Result<Self, VisionError> {
        match *values {
            [x, y] => Ok(SpatialRef::Point([x, y])),
            [x1, y1, x2, y2] => Ok(SpatialRef::BBox([x1, y1, x2, y2])),
            _ => Err(VisionError::validation(
                "spatial_refs",
                format!(
                    "expected 2 (point) or 4 (bbox) coordinates, got {}",
                    values.len()
                ),
            )),
        }
    }

    pub fn coordinates(&self) -> &[f64] {
        match self {
            SpatialRef::Point(p) => p,
            SpatialRef::BBox(b) => b,
        }
    }

    fn validate(&self, index: usize) -> Result<(), VisionError> {
        for value in self.coordinates() {
            if !value.is_finite() || !(0.0..=1.0).contains(value) {
                return Err(VisionError::validation(
                    "spatial_refs",
                    format!("entry {} has coordinate {} outside [0, 1]", index, value),
                ));
            }
        }
        if let SpatialRef::BBox([x1, y1, x2, y2]) = *self {
            if x1 > x2 || y1 > y2 {
                return Err(VisionError::validation(
                    "spatial_refs",
                    format!("entry {} is not an ordered bbox", index),
                ));
            }
        }
        Ok(())
    }
}

/// A validated, serialized request ready for dispatch
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub operation: Operation,
    pub body: Bytes,
    pub stream: bool,
}

impl PreparedRequest {
    fn new<T: Serialize>(operation: Operation, body: &T, stream: bool) -> Result<Self, VisionError> {
        let body = serde_json::to_vec(body)
            .map_err(|e| VisionError::validation("body", e.to_string()))?;
        Ok(Self {
            operation,
            body: Bytes::from(body),
            stream,
        })
    }

    /// The JSON body as a value, mostly useful for diagnostics
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap_or(serde_json::Value::Null)
    }
}

// --- wire bodies ---

#[derive(Serialize)]
struct BaseFields<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    variant: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    settings: Option<&'a SamplingSettings>,
}

#[derive(Serialize)]
struct CaptionBody<'a> {
    image_url: &'a str,
    length: Length,
    stream: bool,
    #[serde(flatten)]
    base: BaseFields<'a>,
}

#[derive(Serialize)]
struct QueryBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    image_url: Option<&'a str>,
    question: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<bool>,
    #[serde(flatten)]
    base: BaseFields<'a>,
}

#[derive(Serialize)]
struct ObjectBody<'a> {
    image_url: &'a str,
    object: &'a str,
    #[serde(flatten)]
    base: BaseFields<'a>,
}

#[derive(Serialize)]
struct SegmentBody<'a> {
    image_url: &'a str,
    object: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    spatial_refs: Option<&'a [SpatialRef]>,
    stream: bool,
    #[serde(flatten)]
    base: BaseFields<'a>,
}

fn require_text(field: &'static str, value: &str) -> Result<(), VisionError> {
    if value.trim().is_empty() {
        return Err(VisionError::validation(field, "must not be empty or whitespace only"));
    }
    Ok(())
}

// --- requests ---

/// Request a caption for an image
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionRequest {
    pub image: ImageInput,
    pub length: Length,
    pub stream: bool,
    pub base: BaseRequest,
}

impl CaptionRequest {
    pub fn new(image: impl Into<ImageInput>) -> Self {
        Self {
            image: image.into(),
            length: Length::default(),
            stream: false,
            base: BaseRequest::default(),
        }
    }

    pub fn with_length(mut self, length: Length) -> Self {
        self.length = length;
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.base.variant = Some(variant.into());
        self
    }

    pub fn with_settings(mut self, settings: SamplingSettings) -> Self {
        self.base.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<PreparedRequest, VisionError> {
        self.base.validate()?;
        let image = normalize(self.image)?;
        let body = CaptionBody {
            image_url: image.as_str(),
            length: self.length,
            stream: self.stream,
            base: self.base.fields(),
        };
        PreparedRequest::new(Operation::Caption, &body, self.stream)
    }
}

/// Ask a free-form question about an image
///
/// The image may be omitted when the server already holds one from a prior
/// turn.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub image: Option<ImageInput>,
    pub question: String,
    pub reasoning: Option<bool>,
    pub stream: bool,
    pub base: BaseRequest,
}

impl QueryRequest {
    pub fn new(image: impl Into<ImageInput>, question: impl Into<String>) -> Self {
        Self {
            image: Some(image.into()),
            question: question.into(),
            reasoning: None,
            stream: false,
            base: BaseRequest::default(),
        }
    }

    /// Question about the image the server already holds
    pub fn without_image(question: impl Into<String>) -> Self {
        Self {
            image: None,
            question: question.into(),
            reasoning: None,
            stream: false,
            base: BaseRequest::default(),
        }
    }

    pub fn with_reasoning(mut self, reasoning: bool) -> Self {
        self.reasoning = Some(reasoning);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.base.variant = Some(variant.into());
        self
    }

    pub fn with_settings(mut self, settings: SamplingSettings) -> Self {
        self.base.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<PreparedRequest, VisionError> {
        require_text("question", &self.question)?;
        self.base.validate()?;
        let image = self.image.map(normalize).transpose()?;
        let body = QueryBody {
            image_url: image.as_ref().map(|i| i.as_str()),
            question: &self.question,
            stream: self.stream,
            reasoning: self.reasoning,
            base: self.base.fields(),
        };
        PreparedRequest::new(Operation::Query, &body, self.stream)
    }
}

/// Locate every instance of an object as bounding boxes
#[derive(Debug, Clone, PartialEq)]
pub struct DetectRequest {
    pub image: ImageInput,
    pub object: String,
    pub base: BaseRequest,
}

impl DetectRequest {
    pub fn new(image: impl Into<ImageInput>, object: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            object: object.into(),
            base: BaseRequest::default(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.base.variant = Some(variant.into());
        self
    }

    pub fn with_settings(mut self, settings: SamplingSettings) -> Self {
        self.base.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<PreparedRequest, VisionError> {
        build_object_request(Operation::Detect, self.image, &self.object, &self.base)
    }
}

/// Locate every instance of an object as center points
#[derive(Debug, Clone, PartialEq)]
pub struct PointRequest {
    pub image: ImageInput,
    pub object: String,
    pub base: BaseRequest,
}

impl PointRequest {
    pub fn new(image: impl Into<ImageInput>, object: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            object: object.into(),
            base: BaseRequest::default(),
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.base.variant = Some(variant.into());
        self
    }

    pub fn with_settings(mut self, settings: SamplingSettings) -> Self {
        self.base.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<PreparedRequest, VisionError> {
        build_object_request(Operation::Point, self.image, &self.object, &self.base)
    }
}

fn build_object_request(
    operation: Operation,
    image: ImageInput,
    object: &str,
    base: &BaseRequest,
) -> Result<PreparedRequest, VisionError> {
    require_text("object", object)?;
    base.validate()?;
    let image = normalize(image)?;
    let body = ObjectBody {
        image_url: image.as_str(),
        object,
        base: base.fields(),
    };
    PreparedRequest::new(operation, &body, false)
}

/// Segment an object, optionally seeded with points or boxes
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentRequest {
    pub image: ImageInput,
    pub object: String,
    pub spatial_refs: Option<Vec<SpatialRef>>,
    pub stream: bool,
    pub base: BaseRequest,
}

impl SegmentRequest {
    pub fn new(image: impl Into<ImageInput>, object: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            object: object.into(),
            spatial_refs: None,
            stream: false,
            base: BaseRequest::default(),
        }
    }

    pub fn with_spatial_refs(mut self, spatial_refs: Vec<SpatialRef>) -> Self {
        self.spatial_refs = Some(spatial_refs);
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.base.variant = Some(variant.into());
        self
    }

    pub fn with_settings(mut self, settings: SamplingSettings) -> Self {
        self.base.settings = Some(settings);
        self
    }

    pub fn build(self) -> Result<PreparedRequest, VisionError> {
        require_text("object", &self.object)?;
        self.base.validate()?;
        if let Some(refs) = &self.spatial_refs {
            for (i, spatial_ref) in refs.iter().enumerate() {
                spatial_ref.validate(i)?;
            }
        }
        let image = normalize(self.image)?;
        let body = SegmentBody {
            image_url: image.as_str(),
            object: &self.object,
            spatial_refs: self
                .spatial_refs
                .as_deref()
                .filter(|refs| !refs.is_empty()),
            stream: self.stream,
            base: self.base.fields(),
        };
        PreparedRequest::new(Operation::Segment, &body, self.stream)
    }
}

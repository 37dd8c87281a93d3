// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Result types for vision operations

use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::decode::stream::{SegmentStream, TextStream};
use crate::error::VisionError;

/// Tolerance applied before a coordinate is considered out of range
pub const COORDINATE_EPSILON: f64 = 1e-6;

/// Bounding box with coordinates normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x_min: f64,
    pub y_min: f64,
    pub x_max: f64,
    pub y_max: f64,
}

impl BoundingBox {
    /// Clamp near-boundary values and reject anything else out of range
    pub fn normalized(self) -> Result<Self, String> {
        let bbox = Self {
            x_min: normalize_coordinate("x_min", self.x_min)?,
            y_min: normalize_coordinate("y_min", self.y_min)?,
            x_max: normalize_coordinate("x_max", self.x_max)?,
            y_max: normalize_coordinate("y_max", self.y_max)?,
        };
        if bbox.x_min > bbox.x_max {
            return Err(format!(
                "x_min {} is greater than x_max {}",
                bbox.x_min, bbox.x_max
            ));
        }
        if bbox.y_min > bbox.y_max {
            return Err(format!(
                "y_min {} is greater than y_max {}",
                bbox.y_min, bbox.y_max
            ));
        }
        Ok(bbox)
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> Point {
        Point {
            x: (self.x_min + self.x_max) / 2.0,
            y: (self.y_min + self.y_max) / 2.0,
        }
    }
}

/// Point with coordinates normalized to [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Deserialize)]
#[allow(dead_code)]
#[serde(remote = "BoundingBox")]
struct BoundingBoxFields {
    x_min: f64,
    y_min: f64,
    x_max: f64,
    y_max: f64,
}

#[derive(Deserialize)]
#[allow(dead_code)]
#[serde(remote = "Point")]
struct PointFields {
    x: f64,
    y: f64,
}

/// Read a JSON object only; arrays of bare numbers are rejected
fn object<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Value, D::Error> {
    Map::<String, Value>::deserialize(deserializer).map(Value::Object)
}

impl<'de> Deserialize<'de> for BoundingBox {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        BoundingBoxFields::deserialize(object(deserializer)?).map_err(D::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Point {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        PointFields::deserialize(object(deserializer)?).map_err(D::Error::custom)
    }
}

impl Point {
    pub fn normalized(self) -> Result<Self, String> {
        Ok(Self {
            x: normalize_coordinate("x", self.x)?,
            y: normalize_coordinate("y", self.y)?,
        })
    }
}

fn normalize_coordinate(name: &str, value: f64) -> Result<f64, String> {
    if !value.is_finite() {
        return Err(format!("{} is not a finite number", name));
    }
    if !(-COORDINATE_EPSILON..=1.0 + COORDINATE_EPSILON).contains(&value) {
        return Err(format!("{} {} is outside [0, 1]", name, value));
    }
    Ok(value.clamp(0.0, 1.0))
}

/// Links a span of reasoning text to the image points supporting it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningGrounding {
    /// Character index where the span starts
    pub start_idx: usize,
    /// Character index one past the end of the span
    pub end_idx: usize,
    /// Normalized `(x, y)` points
    #[serde(default)]
    pub points: Vec<(f64, f64)>,
}

/// Explanation that accompanies a query answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reasoning {
    pub text: String,
    #[serde(default)]
    pub grounding: Vec<ReasoningGrounding>,
}

impl Reasoning {
    /// Check that grounding spans are in order, non-overlapping and inside the text
    pub fn validate(&self) -> Result<(), String> {
        let len = self.text.chars().count();
        let mut previous_end = 0;
        for (i, grounding) in self.grounding.iter().enumerate() {
            if grounding.start_idx >= grounding.end_idx {
                return Err(format!(
                    "grounding {} has empty span {}..{}",
                    i, grounding.start_idx, grounding.end_idx
                ));
            }
            if grounding.end_idx > len {
                return Err(format!(
                    "grounding {} ends at {} beyond text length {}",
                    i, grounding.end_idx, len
                ));
            }
            if grounding.start_idx < previous_end {
                return Err(format!(
                    "grounding {} starts at {} before previous span end {}",
                    i, grounding.start_idx, previous_end
                ));
            }
            for &(x, y) in &grounding.points {
                Point { x, y }
                    .normalized()
                    .map_err(|e| format!("grounding {}: {}", i, e))?;
            }
            previous_end = grounding.end_idx;
        }
        Ok(())
    }

    /// Text covered by a grounding span
    pub fn span_text(&self, grounding: &ReasoningGrounding) -> Option<&str> {
        let mut indices = self
            .text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(self.text.len()));
        let start = indices.nth(grounding.start_idx)?;
        let end = indices.nth(grounding.end_idx.checked_sub(grounding.start_idx + 1)?)?;
        self.text.get(start..end)
    }
}

/// Finished segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segmentation {
    /// SVG path data outlining the mask
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
}

/// Incremental update of a streamed segmentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentStreamChunk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
}

/// Generated text, either complete or still arriving
#[derive(Debug)]
pub enum TextResult {
    Complete(String),
    Streaming(TextStream),
}

impl TextResult {
    pub fn is_streaming(&self) -> bool {
        matches!(self, TextResult::Streaming(_))
    }

    /// The complete text, if it was not streamed
    pub fn as_complete(&self) -> Option<&str> {
        match self {
            TextResult::Complete(text) => Some(text),
            TextResult::Streaming(_) => None,
        }
    }

    /// Resolve to the full text, draining the stream if necessary
    pub async fn into_text(self) -> Result<String, VisionError> {
        match self {
            TextResult::Complete(text) => Ok(text),
            TextResult::Streaming(stream) => stream.collect_text().await,
        }
    }
}

#[derive(Debug)]
pub struct CaptionOutput {
    pub caption: TextResult,
}

#[derive(Debug)]
pub struct QueryOutput {
    pub answer: TextResult,
    /// Present on buffered responses; streamed reasoning is attached to the stream
    pub reasoning: Option<Reasoning>,
}

/// Fully resolved query answer
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    pub answer: String,
    pub reasoning: Option<Reasoning>,
}

impl QueryOutput {
    /// Resolve to the answer text and reasoning, draining the stream if necessary
    pub async fn collect(self) -> Result<QueryAnswer, VisionError> {
        match self.answer {
            TextResult::Complete(answer) => Ok(QueryAnswer {
                answer,
                reasoning: self.reasoning,
            }),
            TextResult::Streaming(mut stream) => {
                let answer = stream.drain_text().await?;
                let reasoning = stream.take_reasoning().or(self.reasoning);
                Ok(QueryAnswer { answer, reasoning })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectOutput {
    pub objects: Vec<BoundingBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOutput {
    pub points: Vec<Point>,
}

/// Segmentation result, either complete or still arriving
#[derive(Debug)]
pub enum SegmentOutput {
    Complete(Segmentation),
    Streaming(SegmentStream),
}

impl SegmentOutput {
    pub fn is_streaming(&self) -> bool {
        matches!(self, SegmentOutput::Streaming(_))
    }

    /// Resolve to the final mask, draining the stream if necessary
    pub async fn into_segmentation(self) -> Result<Segmentation, VisionError> {
        match self {
            SegmentOutput::Complete(segmentation) => Ok(segmentation),
            SegmentOutput::Streaming(stream) => stream.collect_segmentation().await,
        }
    }
}

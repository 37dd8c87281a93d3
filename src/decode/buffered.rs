// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Decoding of complete (non-streamed) response bodies

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{ApiError, VisionError};
use crate::vision::types::{BoundingBox, Point, Reasoning, Segmentation};

/// Longest body excerpt carried by a decode error
const EXCERPT_LIMIT: usize = 256;

// --- wire payloads ---

#[derive(Deserialize)]
struct CaptionPayload {
    caption: String,
}

#[derive(Deserialize)]
struct QueryPayload {
    answer: String,
    #[serde(default)]
    reasoning: Option<Reasoning>,
}

#[derive(Deserialize)]
struct DetectPayload {
    objects: Vec<BoundingBox>,
}

#[derive(Deserialize)]
struct PointPayload {
    points: Vec<Point>,
}

#[derive(Deserialize)]
struct SegmentPayload {
    path: String,
    #[serde(default)]
    bbox: Option<BoundingBox>,
}

/// Shorten a body for inclusion in error messages
pub fn excerpt(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= EXCERPT_LIMIT {
        return text.into_owned();
    }
    let mut short: String = text.chars().take(EXCERPT_LIMIT).collect();
    short.push_str("...");
    short
}

fn parse<T: DeserializeOwned>(context: &'static str, body: &[u8]) -> Result<T, VisionError> {
    serde_json::from_slice(body).map_err(|e| decode_error(context, e.to_string(), body))
}

fn decode_error(context: &'static str, reason: String, body: &[u8]) -> VisionError {
    VisionError::Decode {
        context,
        reason,
        excerpt: excerpt(body),
    }
}

pub fn decode_caption(body: &[u8]) -> Result<String, VisionError> {
    Ok(parse::<CaptionPayload>("caption", body)?.caption)
}

pub fn decode_query(body: &[u8]) -> Result<(String, Option<Reasoning>), VisionError> {
    let payload: QueryPayload = parse("query", body)?;
    if let Some(reasoning) = &payload.reasoning {
        reasoning
            .validate()
            .map_err(|reason| decode_error("query", reason, body))?;
    }
    Ok((payload.answer, payload.reasoning))
}

pub fn decode_detect(body: &[u8]) -> Result<Vec<BoundingBox>, VisionError> {
    let payload: DetectPayload = parse("detect", body)?;
    payload
        .objects
        .into_iter()
        .enumerate()
        .map(|(i, bbox)| {
            bbox.normalized()
                .map_err(|reason| decode_error("detect", format!("object {}: {}", i, reason), body))
        })
        .collect()
}

pub fn decode_point(body: &[u8]) -> Result<Vec<Point>, VisionError> {
    let payload: PointPayload = parse("point", body)?;
    payload
        .points
        .into_iter()
        .enumerate()
        .map(|(i, point)| {
            point
                .normalized()
                .map_err(|reason| decode_error("point", format!("point {}: {}", i, reason), body))
        })
        .collect()
}

pub fn decode_segment(body: &[u8]) -> Result<Segmentation, VisionError> {
    let payload: SegmentPayload = parse("segment", body)?;
    let bbox = payload
        .bbox
        .map(BoundingBox::normalized)
        .transpose()
        .map_err(|reason| decode_error("segment", reason, body))?;
    Ok(Segmentation {
        path: payload.path,
        bbox,
    })
}

/// Turn a non-2xx body into an `ApiError`
///
/// Understands `{"error": {"message", "code", "details"}}`, `{"error": "..."}`
/// and `{"detail": "..."}`; anything else becomes the raw text or the
/// status reason.
pub fn decode_api_error(status: StatusCode, body: &[u8]) -> ApiError {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("unknown error")
            .to_string()
    };

    let value: serde_json::Value = match serde_json::from_slice(body) {
        Ok(value) => value,
        Err(_) => {
            let text = excerpt(body);
            let message = if text.trim().is_empty() {
                fallback()
            } else {
                text.trim().to_string()
            };
            return ApiError {
                message,
                code: None,
                details: None,
            };
        }
    };

    let as_text = |v: &serde_json::Value| match v {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    };

    match value.get("error") {
        Some(serde_json::Value::Object(error)) => ApiError {
            message: error
                .get("message")
                .and_then(as_text)
                .unwrap_or_else(fallback),
            code: error.get("code").and_then(as_text),
            details: error.get("details").cloned(),
        },
        Some(serde_json::Value::String(message)) => ApiError {
            message: message.clone(),
            code: None,
            details: None,
        },
        _ => ApiError {
            message: value
                .get("detail")
                .or_else(|| value.get("message"))
                .and_then(as_text)
                .unwrap_or_else(fallback),
            code: None,
            details: None,
        },
    }
}

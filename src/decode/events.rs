// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Event-record framing for streamed responses
//!
//! Streamed bodies are server-sent-event text: each `data: <json>` line is
//! one record. Records are parsed only once their whole line has arrived, so
//! multi-byte characters split across network chunks are reassembled before
//! UTF-8 decoding.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Buf, Bytes, BytesMut};
use futures::stream::Stream;
use serde::Deserialize;

use super::buffered::excerpt;
use crate::error::VisionError;
use crate::vision::types::{BoundingBox, Reasoning};

/// Alternate terminal marker used by OpenAI-style servers
const DONE_SENTINEL: &str = "[DONE]";

/// One record of a streamed response
///
/// A record may carry several fields at once, e.g. a final fragment together
/// with the terminal flag.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StreamRecord {
    /// Incremental text fragment
    #[serde(default)]
    pub chunk: Option<String>,
    /// Terminal marker
    #[serde(default)]
    pub completed: Option<bool>,
    /// Error reported by the server mid-stream
    #[serde(default)]
    pub error: Option<serde_json::Value>,
    /// Query reasoning, sent once after the answer text
    #[serde(default)]
    pub reasoning: Option<Reasoning>,
    /// Segmentation bounding box update
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    /// Segmentation path update
    #[serde(default)]
    pub path: Option<String>,
}

impl StreamRecord {
    pub fn terminal() -> Self {
        Self {
            completed: Some(true),
            ..Self::default()
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.completed == Some(true)
    }

    /// Error message, if the server reported one
    pub fn error_message(&self) -> Option<String> {
        match self.error.as_ref()? {
            serde_json::Value::Null => None,
            serde_json::Value::String(message) => Some(message.clone()),
            serde_json::Value::Object(error) => Some(
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .map(str::to_string)
                    .unwrap_or_else(|| serde_json::Value::Object(error.clone()).to_string()),
            ),
            other => Some(other.to_string()),
        }
    }
}

/// Parse one line of an event stream
///
/// Returns `None` for blank lines, comments and non-data fields.
pub fn parse_line(line: &str) -> Option<Result<StreamRecord, VisionError>> {
    let line = line.strip_suffix('\r').unwrap_or(line);
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }

    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        // Newline-delimited JSON without SSE framing
        None if line.trim_start().starts_with('{') => line,
        // event:, id:, retry: and unknown fields carry nothing we use
        None => return None,
    };

    if payload.trim() == DONE_SENTINEL {
        return Some(Ok(StreamRecord::terminal()));
    }

    Some(serde_json::from_str(payload).map_err(|e| {
        VisionError::Stream(format!(
            "malformed event record ({}): {}",
            e,
            excerpt(payload.as_bytes())
        ))
    }))
}

/// Turns a chunked byte stream into a stream of records
pub struct EventReader<S> {
    chunks: Pin<Box<S>>,
    buffer: BytesMut,
    exhausted: bool,
}

impl<S> EventReader<S>
where
    S: Stream<Item = Result<Bytes, VisionError>>,
{
    pub fn new(chunks: S) -> Self {
        Self {
            chunks: Box::pin(chunks),
            buffer: BytesMut::new(),
            exhausted: false,
        }
    }

    /// Pop the next complete line out of the buffer
    fn next_line(&mut self) -> Option<Result<String, VisionError>> {
        let newline = self.buffer.iter().position(|&b| b == b'\n')?;
        let line = self.buffer.split_to(newline);
        self.buffer.advance(1);
        Some(decode_utf8(line))
    }

    /// Whatever is left once the body has ended
    fn take_remainder(&mut self) -> Option<Result<String, VisionError>> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = self.buffer.split();
        Some(decode_utf8(rest))
    }
}

fn decode_utf8(bytes: BytesMut) -> Result<String, VisionError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| VisionError::Stream(format!("event record is not valid UTF-8: {}", e)))
}

impl<S> Stream for EventReader<S>
where
    S: Stream<Item = Result<Bytes, VisionError>>,
{
    type Item = Result<StreamRecord, VisionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            while let Some(line) = this.next_line() {
                match line {
                    Ok(line) => {
                        if let Some(record) = parse_line(&line) {
                            return Poll::Ready(Some(record));
                        }
                    }
                    Err(e) => return Poll::Ready(Some(Err(e))),
                }
            }

            if this.exhausted {
                return match this.take_remainder() {
                    Some(Ok(line)) => match parse_line(&line) {
                        Some(record) => Poll::Ready(Some(record)),
                        None => Poll::Ready(None),
                    },
                    Some(Err(e)) => Poll::Ready(Some(Err(e))),
                    None => Poll::Ready(None),
                };
            }

            match this.chunks.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => this.buffer.extend_from_slice(&chunk),
                Poll::Ready(Some(Err(e))) => {
                    this.exhausted = true;
                    this.buffer.clear();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => this.exhausted = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

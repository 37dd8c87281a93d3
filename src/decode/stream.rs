// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Lazily consumed streamed results
//!
//! A stream is single-consumer and moves through `Open` to exactly one of
//! `Completed`, `Failed` or `Abandoned`. Once it leaves `Open` the response
//! body is released and every further poll yields `None`.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::stream::{Stream, StreamExt};
use tracing::debug;

use super::events::{EventReader, StreamRecord};
use crate::error::VisionError;
use crate::transport::BodyStream;
use crate::vision::request::Operation;
use crate::vision::types::{Reasoning, SegmentStreamChunk, Segmentation};

type Records = EventReader<BodyStream>;

/// Lifecycle state of a streamed result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Still delivering fragments
    Open,
    /// Terminal record received
    Completed,
    /// Server error record, transport failure, timeout or early end of body
    Failed,
    /// Consumer stopped before the terminal record
    Abandoned,
}

/// Shared bookkeeping for both stream kinds
struct RecordSource {
    operation: Operation,
    records: Option<Records>,
    outcome: StreamOutcome,
}

impl RecordSource {
    fn new(operation: Operation, body: BodyStream) -> Self {
        Self {
            operation,
            records: Some(EventReader::new(body)),
            outcome: StreamOutcome::Open,
        }
    }

    fn finish(&mut self, outcome: StreamOutcome) {
        if self.outcome == StreamOutcome::Open {
            self.outcome = outcome;
            // Dropping the reader releases the connection
            self.records = None;
        }
    }

    fn fail(&mut self, error: VisionError) -> VisionError {
        debug!("Vision {} stream failed: {}", self.operation, error);
        self.finish(StreamOutcome::Failed);
        error
    }

    /// Next record, with server errors and early end of body mapped to failures
    fn poll_record(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<StreamRecord, VisionError>>> {
        let records = match self.records.as_mut() {
            Some(records) if self.outcome == StreamOutcome::Open => records,
            _ => return Poll::Ready(None),
        };

        match records.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(record))) => match record.error_message() {
                Some(message) => Poll::Ready(Some(Err(self.fail(VisionError::Stream(format!(
                    "server reported an error: {}",
                    message
                )))))),
                None => {
                    if record.is_terminal() {
                        debug!("Vision {} stream completed", self.operation);
                        self.finish(StreamOutcome::Completed);
                    }
                    Poll::Ready(Some(Ok(record)))
                }
            },
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(self.fail(e)))),
            Poll::Ready(None) => Poll::Ready(Some(Err(self.fail(VisionError::Stream(
                "response ended before completion".to_string(),
            ))))),
            Poll::Pending => Poll::Pending,
        }
    }

    fn abandon(&mut self) {
        if self.outcome == StreamOutcome::Open {
            debug!("Vision {} stream abandoned by consumer", self.operation);
            self.finish(StreamOutcome::Abandoned);
        }
    }
}

/// Text fragments of a streamed caption or query answer
///
/// Concatenating every yielded fragment gives the same text a buffered
/// request would have returned. Reasoning sent alongside a query answer is
/// kept on the stream instead of being yielded.
pub struct TextStream {
    source: RecordSource,
    reasoning: Option<Reasoning>,
}

impl TextStream {
    pub fn new(operation: Operation, body: BodyStream) -> Self {
        Self {
            source: RecordSource::new(operation, body),
            reasoning: None,
        }
    }

    pub fn outcome(&self) -> StreamOutcome {
        self.source.outcome
    }

    /// Reasoning received so far
    pub fn reasoning(&self) -> Option<&Reasoning> {
        self.reasoning.as_ref()
    }

    pub fn take_reasoning(&mut self) -> Option<Reasoning> {
        self.reasoning.take()
    }

    /// Read every remaining fragment and return their concatenation
    ///
    /// The stream stays usable for `reasoning()` afterwards.
    pub async fn drain_text(&mut self) -> Result<String, VisionError> {
        let mut text = String::new();
        while let Some(fragment) = self.next().await {
            text.push_str(&fragment?);
        }
        Ok(text)
    }

    pub async fn collect_text(mut self) -> Result<String, VisionError> {
        self.drain_text().await
    }

    /// Stop consuming and release the connection
    pub fn close(mut self) -> StreamOutcome {
        self.source.abandon();
        self.source.outcome
    }
}

impl Stream for TextStream {
    type Item = Result<String, VisionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            let record = match this.source.poll_record(cx) {
                Poll::Ready(Some(Ok(record))) => record,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            };

            if let Some(reasoning) = record.reasoning {
                if let Err(reason) = reasoning.validate() {
                    let error = VisionError::Stream(format!("invalid reasoning: {}", reason));
                    return Poll::Ready(Some(Err(this.source.fail(error))));
                }
                this.reasoning = Some(reasoning);
            }

            // A terminal record may still carry the last fragment
            match record.chunk {
                Some(chunk) if !chunk.is_empty() => return Poll::Ready(Some(Ok(chunk))),
                _ if record.completed == Some(true) => return Poll::Ready(None),
                _ => continue,
            }
        }
    }
}

impl Drop for TextStream {
    fn drop(&mut self) {
        self.source.abandon();
    }
}

impl std::fmt::Debug for TextStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextStream")
            .field("operation", &self.source.operation)
            .field("outcome", &self.source.outcome)
            .field("has_reasoning", &self.reasoning.is_some())
            .finish()
    }
}

/// Incremental updates of a streamed segmentation
pub struct SegmentStream {
    source: RecordSource,
}

impl SegmentStream {
    pub fn new(body: BodyStream) -> Self {
        Self {
            source: RecordSource::new(Operation::Segment, body),
        }
    }

    pub fn outcome(&self) -> StreamOutcome {
        self.source.outcome
    }

    /// Drain the stream into the final mask
    ///
    /// The final `path` wins when the server sends one, otherwise the path is
    /// the concatenation of every `chunk`. The last bounding box seen is kept.
    pub async fn collect_segmentation(mut self) -> Result<Segmentation, VisionError> {
        let mut pieces = String::new();
        let mut path = None;
        let mut bbox = None;

        while let Some(update) = self.next().await {
            let update = update?;
            if let Some(chunk) = update.chunk {
                pieces.push_str(&chunk);
            }
            if update.path.is_some() {
                path = update.path;
            }
            if update.bbox.is_some() {
                bbox = update.bbox;
            }
        }

        let path = path.unwrap_or(pieces);
        if path.is_empty() {
            return Err(VisionError::Stream(
                "segmentation stream carried no path".to_string(),
            ));
        }
        Ok(Segmentation { path, bbox })
    }

    pub fn close(mut self) -> StreamOutcome {
        self.source.abandon();
        self.source.outcome
    }
}

impl Stream for SegmentStream {
    type Item = Result<SegmentStreamChunk, VisionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            let record = match this.source.poll_record(cx) {
                Poll::Ready(Some(Ok(record))) => record,
                Poll::Ready(Some(Err(e))) => return Poll::Ready(Some(Err(e))),
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            };

            let terminal = record.is_terminal();
            let bbox = match record.bbox.map(|b| b.normalized()).transpose() {
                Ok(bbox) => bbox,
                Err(reason) => {
                    let error = VisionError::Stream(format!("invalid bbox: {}", reason));
                    return Poll::Ready(Some(Err(this.source.fail(error))));
                }
            };

            let update = SegmentStreamChunk {
                bbox,
                chunk: record.chunk,
                path: record.path,
                completed: terminal.then_some(true),
            };
            if update.bbox.is_some() || update.chunk.is_some() || update.path.is_some() {
                return Poll::Ready(Some(Ok(update)));
            }
            if terminal {
                return Poll::Ready(None);
            }
        }
    }
}

impl Drop for SegmentStream {
    fn drop(&mut self) {
        self.source.abandon();
    }
}

impl std::fmt::Debug for SegmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentStream")
            .field("outcome", &self.source.outcome)
            .finish()
    }
}

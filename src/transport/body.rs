// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Streamed response body with an inactivity deadline

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures::stream::Stream;
use tokio::time::{sleep, Instant, Sleep};
use tracing::debug;

use crate::error::{TimeoutPhase, VisionError};

type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, VisionError>> + Send>>;

/// Open response body whose chunks arrive incrementally
///
/// Each chunk must arrive within `timeout` of the previous one. On timeout,
/// transport error or end of body the inner stream is dropped, which closes
/// the underlying connection.
pub struct BodyStream {
    inner: Option<ChunkStream>,
    idle: Pin<Box<Sleep>>,
    timeout: Duration,
}

impl BodyStream {
    /// Wrap a live reqwest response body
    pub fn from_response(response: reqwest::Response, timeout: Duration) -> Self {
        use futures::StreamExt;
        Self::new(response.bytes_stream().map(|r| r.map_err(VisionError::from)), timeout)
    }

    /// Wrap any chunk stream
    pub fn new<S>(chunks: S, timeout: Duration) -> Self
    where
        S: Stream<Item = Result<Bytes, VisionError>> + Send + 'static,
    {
        Self {
            inner: Some(Box::pin(chunks)),
            idle: Box::pin(sleep(timeout)),
            timeout,
        }
    }

    /// Whether the underlying body has been released
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }

    fn close(&mut self) {
        self.inner = None;
    }

    /// Read the remaining body to the end
    ///
    /// The deadline applies to each gap between chunks, not to the whole
    /// body. A gap timeout is reported as a `Body` phase timeout.
    pub async fn read_to_end(mut self) -> Result<Bytes, VisionError> {
        use futures::StreamExt;
        let mut body = BytesMut::new();
        while let Some(chunk) = self.next().await {
            match chunk {
                Ok(chunk) => body.extend_from_slice(&chunk),
                Err(VisionError::Timeout {
                    phase: TimeoutPhase::Inactivity,
                    timeout,
                }) => {
                    return Err(VisionError::Timeout {
                        phase: TimeoutPhase::Body,
                        timeout,
                    })
                }
                Err(e) => return Err(e),
            }
        }
        Ok(body.freeze())
    }
}

impl Stream for BodyStream {
    type Item = Result<Bytes, VisionError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let inner = match this.inner.as_mut() {
            Some(inner) => inner,
            None => return Poll::Ready(None),
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                let deadline = Instant::now() + this.timeout;
                this.idle.as_mut().reset(deadline);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.close();
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.close();
                Poll::Ready(None)
            }
            Poll::Pending => match this.idle.as_mut().poll(cx) {
                Poll::Ready(()) => {
                    debug!("Response body idle for {:?}, closing", this.timeout);
                    this.close();
                    Poll::Ready(Some(Err(VisionError::Timeout {
                        phase: TimeoutPhase::Inactivity,
                        timeout: this.timeout,
                    })))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

impl std::fmt::Debug for BodyStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BodyStream")
            .field("closed", &self.is_closed())
            .field("timeout", &self.timeout)
            .finish()
    }
}

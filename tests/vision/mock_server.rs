// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! In-process mock inference server
//!
//! Serves scripted buffered or event-stream replies per operation path and
//! records every request it receives.

use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures_util::stream::{self, StreamExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A small valid JPEG header; the server never decodes it
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

/// One request as observed by the server
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
}

/// Sets a flag when the response body is dropped by the server
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Scripted reply for one request
#[derive(Clone)]
pub enum Reply {
    /// Buffered JSON body
    Json(StatusCode, serde_json::Value),
    /// Buffered non-JSON body
    Text(StatusCode, String),
    /// Event-stream body
    Events(EventScript),
    /// Never send response headers
    Stall,
}

impl Reply {
    pub fn ok(value: serde_json::Value) -> Self {
        Reply::Json(StatusCode::OK, value)
    }

    pub fn events<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Reply::Events(EventScript::new(records))
    }
}

/// Event-stream body: chunks, pacing and what happens after the last chunk
#[derive(Clone)]
pub struct EventScript {
    chunks: Vec<String>,
    interval: Duration,
    hang_after: bool,
    dropped: Option<Arc<AtomicBool>>,
}

impl EventScript {
    /// Each record is framed as `data: <record>\n\n`
    pub fn new<I, S>(records: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::raw(
            records
                .into_iter()
                .map(|r| format!("data: {}\n\n", r.into())),
        )
    }

    /// Chunks sent verbatim
    pub fn raw<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            chunks: chunks.into_iter().map(Into::into).collect(),
            interval: Duration::ZERO,
            hang_after: false,
            dropped: None,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Keep the body open without sending anything after the last chunk
    pub fn hang_after(mut self) -> Self {
        self.hang_after = true;
        self
    }

    /// Flag raised once the server drops the body
    pub fn track_drop(mut self, dropped: Arc<AtomicBool>) -> Self {
        self.dropped = Some(dropped);
        self
    }

    fn into_body(self) -> Body {
        let guard = self.dropped.map(DropFlag);
        let interval = self.interval;
        let chunks = stream::unfold(
            (self.chunks.into_iter(), guard),
            move |(mut chunks, guard)| async move {
                if !interval.is_zero() {
                    tokio::time::sleep(interval).await;
                }
                match chunks.next() {
                    Some(chunk) => Some((Ok::<_, Infallible>(Bytes::from(chunk)), (chunks, guard))),
                    None => None,
                }
            },
        );
        if self.hang_after {
            Body::from_stream(chunks.chain(stream::pending()))
        } else {
            Body::from_stream(chunks)
        }
    }
}

#[derive(Default)]
struct MockState {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    requests: Mutex<Vec<Recorded>>,
}

/// Running mock server, shut down on drop
pub struct MockServer {
    pub base_url: String,
    state: Arc<MockState>,
    handle: JoinHandle<()>,
}

impl MockServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}/v1", addr),
            state,
            handle,
        }
    }

    /// Queue a reply for a path such as `/caption`
    ///
    /// Replies are served in order; the last one repeats.
    pub fn reply(&self, path: &str, reply: Reply) -> &Self {
        self.state
            .replies
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests().iter().filter(|r| r.path == path).count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = uri
        .path()
        .strip_prefix("/v1")
        .unwrap_or(uri.path())
        .to_string();

    state.requests.lock().unwrap().push(Recorded {
        method,
        path: path.clone(),
        headers,
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    });

    let reply = {
        let mut replies = state.replies.lock().unwrap();
        match replies.get_mut(&path) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        }
    };

    match reply {
        Some(Reply::Json(status, value)) => (status, axum::Json(value)).into_response(),
        Some(Reply::Text(status, text)) => (status, text).into_response(),
        Some(Reply::Events(script)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, "text/event-stream")
            .body(script.into_body())
            .unwrap(),
        Some(Reply::Stall) => {
            std::future::pending::<()>().await;
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        None if path == "/health" => (StatusCode::OK, "ok").into_response(),
        None => (StatusCode::NOT_FOUND, "no reply scripted").into_response(),
    }
}

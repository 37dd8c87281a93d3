// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Query answers, reasoning and request validation

use moondream_client::{
    ClientConfig, QueryRequest, StreamOutcome, TextResult, VisionError, VlClient,
};
use serde_json::json;
use tokio_test::assert_err;

use super::mock_server::{MockServer, Reply, JPEG_BYTES};

fn client(server: &MockServer) -> VlClient {
    VlClient::new(ClientConfig::local(&server.base_url)).unwrap()
}

fn reasoning_json() -> serde_json::Value {
    json!({
        "text": "I can see two dogs on the grass",
        "grounding": [
            {"start_idx": 14, "end_idx": 18, "points": [[0.25, 0.6], [0.7, 0.55]]}
        ]
    })
}

#[tokio::test]
async fn test_buffered_query() {
    let server = MockServer::start().await;
    server.reply("/query", Reply::ok(json!({ "answer": "Two dogs." })));

    let output = client(&server)
        .query(QueryRequest::new(JPEG_BYTES, "How many dogs are there?"))
        .await
        .unwrap();
    let answer = output.collect().await.unwrap();
    assert_eq!(answer.answer, "Two dogs.");
    assert!(answer.reasoning.is_none());

    let body = &server.requests()[0].body;
    assert_eq!(body["question"], "How many dogs are there?");
    assert!(body.get("reasoning").is_none());
}

#[tokio::test]
async fn test_buffered_query_with_reasoning() {
    let server = MockServer::start().await;
    server.reply(
        "/query",
        Reply::ok(json!({ "answer": "Two", "reasoning": reasoning_json() })),
    );

    let output = client(&server)
        .query(QueryRequest::new(JPEG_BYTES, "How many dogs?").with_reasoning(true))
        .await
        .unwrap();
    let reasoning = output.reasoning.clone().unwrap();
    assert_eq!(reasoning.span_text(&reasoning.grounding[0]), Some("dogs"));
    assert_eq!(reasoning.grounding[0].points.len(), 2);
    assert_eq!(server.requests()[0].body["reasoning"], true);
}

#[tokio::test]
async fn test_streamed_query_equals_buffered() {
    let server = MockServer::start().await;
    server
        .reply(
            "/query",
            Reply::ok(json!({ "answer": "Two", "reasoning": reasoning_json() })),
        )
        .reply(
            "/query",
            Reply::events([
                json!({ "chunk": "T" }).to_string(),
                json!({ "chunk": "wo" }).to_string(),
                json!({ "reasoning": reasoning_json() }).to_string(),
                json!({ "completed": true }).to_string(),
            ]),
        );
    let client = client(&server);
    let request = QueryRequest::new(JPEG_BYTES, "How many dogs?").with_reasoning(true);

    let buffered = client
        .query(request.clone())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();
    let streamed = client
        .query(request.with_stream(true))
        .await
        .unwrap();
    assert!(streamed.answer.is_streaming());
    let streamed = streamed.collect().await.unwrap();

    assert_eq!(streamed, buffered);
}

#[tokio::test]
async fn test_streamed_reasoning_not_yielded_as_text() {
    let server = MockServer::start().await;
    server.reply(
        "/query",
        Reply::events([
            json!({ "reasoning": reasoning_json() }).to_string(),
            json!({ "chunk": "Two", "completed": true }).to_string(),
        ]),
    );
    let output = client(&server)
        .query(QueryRequest::new(JPEG_BYTES, "How many dogs?").with_stream(true))
        .await
        .unwrap();
    let mut stream = match output.answer {
        TextResult::Streaming(stream) => stream,
        TextResult::Complete(_) => panic!("expected a streamed answer"),
    };

    assert_eq!(stream.drain_text().await.unwrap(), "Two");
    assert_eq!(stream.outcome(), StreamOutcome::Completed);
    assert_eq!(
        stream.reasoning().unwrap().text,
        "I can see two dogs on the grass"
    );
}

#[tokio::test]
async fn test_empty_question_rejected_before_exchange() {
    let server = MockServer::start().await;
    server.reply("/query", Reply::ok(json!({ "answer": "unused" })));

    let err = assert_err!(client(&server).query(QueryRequest::new(JPEG_BYTES, "")).await);
    assert!(matches!(
        err,
        VisionError::Validation {
            field: "question",
            ..
        }
    ));

    let err = assert_err!(
        client(&server)
            .query(QueryRequest::new(JPEG_BYTES, "   \n"))
            .await
    );
    assert!(err.is_local());
    assert_eq!(server.request_count("/query"), 0);
}

#[tokio::test]
async fn test_query_without_image_omits_image_url() {
    let server = MockServer::start().await;
    server.reply("/query", Reply::ok(json!({ "answer": "Yes." })));

    let output = client(&server)
        .query(QueryRequest::without_image("Is it still there?"))
        .await
        .unwrap();
    assert_eq!(output.answer.as_complete(), Some("Yes."));
    assert!(server.requests()[0].body.get("image_url").is_none());
}

#[tokio::test]
async fn test_invalid_grounding_is_decode_error() {
    let server = MockServer::start().await;
    server.reply(
        "/query",
        Reply::ok(json!({
            "answer": "Two",
            "reasoning": {"text": "dogs", "grounding": [{"start_idx": 2, "end_idx": 90, "points": []}]}
        })),
    );
    let err = client(&server)
        .query(QueryRequest::new(JPEG_BYTES, "How many dogs?"))
        .await
        .unwrap_err();
    assert!(matches!(err, VisionError::Decode { context: "query", .. }));
}

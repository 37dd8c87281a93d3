// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Caption over buffered and streamed responses

use futures_util::StreamExt;
use moondream_client::{
    CaptionRequest, ClientConfig, Length, SamplingSettings, StreamOutcome, TextResult, VisionError,
    VlClient,
};
use serde_json::json;

use super::mock_server::{MockServer, Reply, JPEG_BYTES};

const CAPTION: &str = "A tabby cat asleep on a sofa.";

fn client(server: &MockServer) -> VlClient {
    VlClient::new(ClientConfig::local(&server.base_url)).unwrap()
}

async fn server_with_caption() -> MockServer {
    let server = MockServer::start().await;
    server.reply("/caption", Reply::ok(json!({ "caption": CAPTION })));
    server
}

#[tokio::test]
async fn test_buffered_caption() {
    let server = server_with_caption().await;
    let request = CaptionRequest::new(JPEG_BYTES).with_length(Length::Short);
    let output = client(&server).caption(request).await.unwrap();

    assert!(!output.caption.is_streaming());
    assert_eq!(output.caption.as_complete(), Some(CAPTION));

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let body = &requests[0].body;
    assert_eq!(body["length"], "short");
    assert_eq!(body["stream"], false);
    assert!(body["image_url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}

#[tokio::test]
async fn test_streamed_caption_equals_buffered() {
    let server = server_with_caption().await;
    server.reply(
        "/caption",
        Reply::events([
            r#"{"chunk": "A tabby "}"#,
            r#"{"chunk": "cat asleep "}"#,
            r#"{"chunk": "on a sofa."}"#,
            r#"{"completed": true}"#,
        ]),
    );
    let client = client(&server);

    let buffered = client
        .caption(CaptionRequest::new(JPEG_BYTES).with_length(Length::Short))
        .await
        .unwrap()
        .caption
        .into_text()
        .await
        .unwrap();

    let output = client
        .caption(
            CaptionRequest::new(JPEG_BYTES)
                .with_length(Length::Short)
                .with_stream(true),
        )
        .await
        .unwrap();
    let mut stream = match output.caption {
        TextResult::Streaming(stream) => stream,
        TextResult::Complete(_) => panic!("expected a streamed caption"),
    };

    let mut fragments = Vec::new();
    while let Some(fragment) = stream.next().await {
        fragments.push(fragment.unwrap());
    }
    assert_eq!(fragments, vec!["A tabby ", "cat asleep ", "on a sofa."]);
    assert_eq!(fragments.concat(), buffered);
    assert_eq!(stream.outcome(), StreamOutcome::Completed);

    let streamed = server.requests();
    assert_eq!(streamed[1].body["stream"], true);
    assert_eq!(
        streamed[1].headers.get("accept").unwrap(),
        "text/event-stream"
    );
}

#[tokio::test]
async fn test_identical_requests_identical_wire_bodies() {
    let server = server_with_caption().await;
    let client = client(&server);
    let request = CaptionRequest::new(JPEG_BYTES)
        .with_variant("moondream-2b")
        .with_settings(SamplingSettings::with_max_tokens(64));

    let first = client.caption(request.clone()).await.unwrap();
    let second = client.caption(request).await.unwrap();
    assert_eq!(first.caption.as_complete(), second.caption.as_complete());

    let requests = server.requests();
    assert_eq!(requests[0].body, requests[1].body);
    assert_eq!(requests[0].body["variant"], "moondream-2b");
    assert_eq!(requests[0].body["settings"]["max_tokens"], 64);
}

#[tokio::test]
async fn test_local_endpoint_sends_no_credential() {
    let server = server_with_caption().await;
    let config = ClientConfig::local(&server.base_url).with_api_key("not-for-local");
    let client = VlClient::new(config).unwrap();
    client.caption(CaptionRequest::new(JPEG_BYTES)).await.unwrap();

    let headers = &server.requests()[0].headers;
    assert!(headers.get("x-moondream-auth").is_none());
    assert_eq!(headers.get("content-type").unwrap(), "application/json");
    assert!(headers
        .get("user-agent")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("moondream-rust/"));
}

#[tokio::test]
async fn test_stream_ending_without_terminal_fails() {
    let server = MockServer::start().await;
    server.reply(
        "/caption",
        Reply::events([r#"{"chunk": "A tabby"}"#, r#"{"chunk": " cat"}"#]),
    );
    let output = client(&server)
        .caption(CaptionRequest::new(JPEG_BYTES).with_stream(true))
        .await
        .unwrap();

    let err = output.caption.into_text().await.unwrap_err();
    assert!(matches!(err, VisionError::Stream(_)));
}

#[tokio::test]
async fn test_stream_error_record_surfaces_mid_stream() {
    let server = MockServer::start().await;
    server.reply(
        "/caption",
        Reply::events([
            r#"{"chunk": "A tabby"}"#,
            r#"{"error": {"message": "model overloaded"}}"#,
        ]),
    );
    let output = client(&server)
        .caption(CaptionRequest::new(JPEG_BYTES).with_stream(true))
        .await
        .unwrap();
    let mut stream = match output.caption {
        TextResult::Streaming(stream) => stream,
        TextResult::Complete(_) => panic!("expected a streamed caption"),
    };

    assert_eq!(stream.next().await.unwrap().unwrap(), "A tabby");
    let err = stream.next().await.unwrap().unwrap_err();
    assert!(err.to_string().contains("model overloaded"));
    assert!(stream.next().await.is_none());
    assert_eq!(stream.outcome(), StreamOutcome::Failed);
}

#[tokio::test]
async fn test_malformed_caption_body_is_decode_error() {
    let server = MockServer::start().await;
    server.reply("/caption", Reply::ok(json!({ "text": "wrong field" })));
    let err = client(&server)
        .caption(CaptionRequest::new(JPEG_BYTES))
        .await
        .unwrap_err();
    match err {
        VisionError::Decode {
            context, excerpt, ..
        } => {
            assert_eq!(context, "caption");
            assert!(excerpt.contains("wrong field"));
        }
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_data_url_rejected_locally() {
    let server = server_with_caption().await;
    let err = client(&server)
        .caption(CaptionRequest::new(
            moondream_client::ImageInput::data_url("https://example.com/cat.jpg"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, VisionError::InvalidImage(_)));
    assert!(server.requests().is_empty());
}

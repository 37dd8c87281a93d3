// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Segmentation over buffered and streamed responses

use futures_util::StreamExt;
use moondream_client::{
    ClientConfig, SegmentOutput, SegmentRequest, SpatialRef, StreamOutcome, VisionError, VlClient,
};
use serde_json::json;

use super::mock_server::{MockServer, Reply, JPEG_BYTES};

const PATH: &str = "M 0.1 0.1 L 0.9 0.1 L 0.9 0.9 Z";

fn client(server: &MockServer) -> VlClient {
    VlClient::new(ClientConfig::local(&server.base_url)).unwrap()
}

fn bbox_json() -> serde_json::Value {
    json!({"x_min": 0.1, "y_min": 0.1, "x_max": 0.9, "y_max": 0.9})
}

#[tokio::test]
async fn test_buffered_segment() {
    let server = MockServer::start().await;
    server.reply("/segment", Reply::ok(json!({ "path": PATH, "bbox": bbox_json() })));

    let request = SegmentRequest::new(JPEG_BYTES, "cat").with_spatial_refs(vec![
        SpatialRef::Point([0.5, 0.5]),
        SpatialRef::BBox([0.1, 0.1, 0.9, 0.9]),
    ]);
    let output = client(&server).segment(request).await.unwrap();
    assert!(!output.is_streaming());
    let segmentation = output.into_segmentation().await.unwrap();
    assert_eq!(segmentation.path, PATH);
    assert_eq!(segmentation.bbox.unwrap().x_max, 0.9);

    let body = &server.requests()[0].body;
    assert_eq!(
        body["spatial_refs"],
        json!([[0.5, 0.5], [0.1, 0.1, 0.9, 0.9]])
    );
    assert_eq!(body["stream"], false);
}

#[tokio::test]
async fn test_streamed_segment_matches_buffered() {
    let server = MockServer::start().await;
    server
        .reply("/segment", Reply::ok(json!({ "path": PATH, "bbox": bbox_json() })))
        .reply(
            "/segment",
            Reply::events([
                json!({ "bbox": bbox_json() }).to_string(),
                json!({ "chunk": "M 0.1 0.1 L 0.9 0.1 " }).to_string(),
                json!({ "chunk": "L 0.9 0.9 Z" }).to_string(),
                json!({ "path": PATH, "completed": true }).to_string(),
            ]),
        );
    let client = client(&server);

    let buffered = client
        .segment(SegmentRequest::new(JPEG_BYTES, "cat"))
        .await
        .unwrap()
        .into_segmentation()
        .await
        .unwrap();

    let output = client
        .segment(SegmentRequest::new(JPEG_BYTES, "cat").with_stream(true))
        .await
        .unwrap();
    let mut stream = match output {
        SegmentOutput::Streaming(stream) => stream,
        SegmentOutput::Complete(_) => panic!("expected a streamed segmentation"),
    };

    let mut updates = Vec::new();
    while let Some(update) = stream.next().await {
        updates.push(update.unwrap());
    }
    assert_eq!(updates.len(), 4);
    assert!(updates[0].bbox.is_some());
    assert_eq!(updates[3].completed, Some(true));
    assert!(updates[..3].iter().all(|u| u.completed.is_none()));
    assert_eq!(stream.outcome(), StreamOutcome::Completed);

    let chunks: String = updates.iter().filter_map(|u| u.chunk.clone()).collect();
    assert_eq!(chunks, buffered.path);
}

#[tokio::test]
async fn test_streamed_segment_collects_from_chunks() {
    let server = MockServer::start().await;
    server.reply(
        "/segment",
        Reply::events([
            json!({ "chunk": "M 0.1 0.1 L 0.9 0.1 " }).to_string(),
            json!({ "chunk": "L 0.9 0.9 Z", "bbox": bbox_json() }).to_string(),
            "[DONE]".to_string(),
        ]),
    );
    let segmentation = client(&server)
        .segment(SegmentRequest::new(JPEG_BYTES, "cat").with_stream(true))
        .await
        .unwrap()
        .into_segmentation()
        .await
        .unwrap();
    assert_eq!(segmentation.path, PATH);
    assert!(segmentation.bbox.is_some());
}

#[tokio::test]
async fn test_invalid_spatial_ref_rejected_before_exchange() {
    let server = MockServer::start().await;
    let err = client(&server)
        .segment(
            SegmentRequest::new(JPEG_BYTES, "cat")
                .with_spatial_refs(vec![SpatialRef::BBox([0.9, 0.1, 0.1, 0.9])]),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        VisionError::Validation {
            field: "spatial_refs",
            ..
        }
    ));
    assert!(server.requests().is_empty());
}

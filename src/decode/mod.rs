// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Response decoding
//!
//! Buffered bodies are decoded in one pass per operation. Streamed bodies
//! are framed into records and exposed as lazily consumed streams.

pub mod buffered;
pub mod events;
pub mod stream;

pub use buffered::{
    decode_api_error, decode_caption, decode_detect, decode_point, decode_query, decode_segment,
};
pub use events::{EventReader, StreamRecord};
pub use stream::{SegmentStream, StreamOutcome, TextStream};

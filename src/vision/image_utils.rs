// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Image normalization for inference requests
//!
//! Every accepted image representation is reduced to a single `data:` URI
//! before it is embedded in a request body. Nothing here touches the network;
//! `ImageInput::from_path` is the only filesystem read.

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};

use crate::error::VisionError;

/// JPEG quality used when encoding decoded images
const JPEG_QUALITY: u8 = 95;

const DATA_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";

/// An image supplied by the caller
#[derive(Debug, Clone, PartialEq)]
pub enum ImageInput {
    /// Raw encoded image bytes (JPEG, PNG, ...)
    Raw(Bytes),
    /// Pre-encoded data URI, e.g. `data:image/jpeg;base64,...`
    DataUrl(String),
}

impl ImageInput {
    /// Wrap a pre-encoded data URI
    pub fn data_url(url: impl Into<String>) -> Self {
        ImageInput::DataUrl(url.into())
    }

    /// Encode a decoded image as JPEG
    pub fn from_image(image: &DynamicImage) -> Result<Self, VisionError> {
        let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
        let mut buffer = Vec::new();
        rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY))
            .map_err(|e| VisionError::InvalidImage(format!("JPEG encoding failed: {}", e)))?;
        Ok(ImageInput::Raw(Bytes::from(buffer)))
    }

    /// Read an image file into memory
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, VisionError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            VisionError::InvalidImage(format!("failed to read {}: {}", path.display(), e))
        })?;
        Ok(ImageInput::Raw(Bytes::from(bytes)))
    }
}

impl From<Vec<u8>> for ImageInput {
    fn from(bytes: Vec<u8>) -> Self {
        ImageInput::Raw(Bytes::from(bytes))
    }
}

impl From<Bytes> for ImageInput {
    fn from(bytes: Bytes) -> Self {
        ImageInput::Raw(bytes)
    }
}

impl From<&[u8]> for ImageInput {
    fn from(bytes: &[u8]) -> Self {
        ImageInput::Raw(Bytes::copy_from_slice(bytes))
    }
}

impl From<EncodedImage> for ImageInput {
    fn from(image: EncodedImage) -> Self {
        ImageInput::DataUrl(image.image_url)
    }
}

/// A validated data URI ready to be sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EncodedImageWire")]
pub struct EncodedImage {
    image_url: String,
}

#[derive(Deserialize)]
struct EncodedImageWire {
    image_url: String,
}

impl TryFrom<EncodedImageWire> for EncodedImage {
    type Error = VisionError;

    fn try_from(wire: EncodedImageWire) -> Result<Self, Self::Error> {
        Self::new(wire.image_url)
    }
}

impl EncodedImage {
    /// Validate an existing data URI
    pub fn new(image_url: impl Into<String>) -> Result<Self, VisionError> {
        let image_url = image_url.into();
        validate_data_url(&image_url)?;
        Ok(Self { image_url })
    }

    /// The data URI
    pub fn as_str(&self) -> &str {
        &self.image_url
    }

    /// Media type declared by the data URI, e.g. `image/png`
    pub fn media_type(&self) -> &str {
        let header = &self.image_url[DATA_SCHEME.len()..];
        let end = header.find([';', ',']).unwrap_or(header.len());
        &header[..end]
    }

    pub fn into_string(self) -> String {
        self.image_url
    }
}

/// Reduce any accepted image representation to a data URI
///
/// Raw bytes are sniffed for a known format; unrecognized bytes are assumed
/// to be JPEG. Data URIs pass through unchanged once validated.
pub fn normalize(input: ImageInput) -> Result<EncodedImage, VisionError> {
    match input {
        ImageInput::Raw(bytes) => encode_bytes(&bytes),
        ImageInput::DataUrl(url) => EncodedImage::new(url),
    }
}

/// Build a base64 data URI from raw image bytes
pub fn encode_bytes(bytes: &[u8]) -> Result<EncodedImage, VisionError> {
    if bytes.is_empty() {
        return Err(VisionError::InvalidImage("image data is empty".to_string()));
    }

    let mime = detect_format(bytes)
        .map(format_to_mime)
        .unwrap_or("image/jpeg");

    // Single allocation sized for the whole URI
    let encoded_len = bytes.len().div_ceil(3) * 4;
    let prefix_len = DATA_SCHEME.len() + mime.len() + BASE64_MARKER.len() + 1;
    let mut image_url = String::with_capacity(prefix_len + encoded_len);
    image_url.push_str(DATA_SCHEME);
    image_url.push_str(mime);
    image_url.push_str(BASE64_MARKER);
    image_url.push(',');
    STANDARD.encode_string(bytes, &mut image_url);

    Ok(EncodedImage { image_url })
}

/// Detect image format from magic bytes
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    match bytes {
        // PNG: 89 50 4E 47 (0x89 P N G)
        [0x89, 0x50, 0x4E, 0x47, ..] => Some(ImageFormat::Png),

        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(ImageFormat::Jpeg),

        // WebP: RIFF .... WEBP
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some(ImageFormat::WebP),

        // GIF: GIF87a or GIF89a
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Some(ImageFormat::Gif),

        // BMP: BM
        [0x42, 0x4D, ..] => Some(ImageFormat::Bmp),

        _ => None,
    }
}

/// MIME type for a detected format
pub fn format_to_mime(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Png => "image/png",
        ImageFormat::WebP => "image/webp",
        ImageFormat::Gif => "image/gif",
        ImageFormat::Bmp => "image/bmp",
        _ => "image/jpeg",
    }
}

fn validate_data_url(url: &str) -> Result<(), VisionError> {
    let rest = url
        .strip_prefix(DATA_SCHEME)
        .ok_or_else(|| VisionError::InvalidImage("data URI must start with 'data:'".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| VisionError::InvalidImage("data URI is missing ','".to_string()))?;

    let media_type = header.split(';').next().unwrap_or_default();
    match media_type.split_once('/') {
        Some(("image", subtype)) if !subtype.is_empty() => {}
        _ => {
            return Err(VisionError::InvalidImage(format!(
                "data URI media type must be image/*, got '{}'",
                media_type
            )))
        }
    }

    if !header.ends_with(BASE64_MARKER) {
        return Err(VisionError::InvalidImage(
            "data URI must be base64 encoded".to_string(),
        ));
    }

    if payload.is_empty() {
        return Err(VisionError::InvalidImage(
            "data URI payload is empty".to_string(),
        ));
    }

    let valid_alphabet = payload
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=' | b'-' | b'_'));
    if !valid_alphabet {
        return Err(VisionError::InvalidImage(
            "data URI payload is not valid base64".to_string(),
        ));
    }

    Ok(())
}

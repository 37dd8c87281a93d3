// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Error types surfaced by the vision client
//!
//! Every failure of a single exchange maps onto one `VisionError` variant so
//! callers can tell local validation problems apart from server answers,
//! timeouts and mid-stream breaks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Error payload returned by the inference server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human readable message
    pub message: String,
    /// Optional machine readable code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Arbitrary structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} ({})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Which part of an exchange ran out of time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// TCP/TLS connection establishment
    Connect,
    /// Waiting for response headers
    FirstByte,
    /// Gap between two chunks of a buffered response body
    Body,
    /// Gap between two chunks of a streamed body
    Inactivity,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            TimeoutPhase::Connect => "connect",
            TimeoutPhase::FirstByte => "time to first byte",
            TimeoutPhase::Body => "response body",
            TimeoutPhase::Inactivity => "stream inactivity",
        };
        f.write_str(phase)
    }
}

/// Errors that can occur while running a vision operation
#[derive(Debug, Error)]
pub enum VisionError {
    /// A request field is missing or malformed
    #[error("Invalid request field `{field}`: {reason}")]
    Validation {
        /// Name of the offending field
        field: &'static str,
        /// Why the value was rejected
        reason: String,
    },

    /// The image could not be normalized into a data URI
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// The exchange exceeded the configured timeout
    #[error("Request timed out after {}ms ({phase})", .timeout.as_millis())]
    Timeout {
        /// Phase that exceeded the deadline
        phase: TimeoutPhase,
        /// Configured deadline
        timeout: Duration,
    },

    /// The server answered with a non-2xx status
    #[error("API request failed with status {status}: {error}")]
    ApiRequest {
        /// HTTP status code
        status: u16,
        /// Decoded error payload
        error: ApiError,
    },

    /// The response body did not have the expected shape
    #[error("Failed to decode {context} response: {reason} (body: {excerpt})")]
    Decode {
        /// Operation whose response was being decoded
        context: &'static str,
        /// Parser message
        reason: String,
        /// Truncated raw body for diagnostics
        excerpt: String,
    },

    /// A streamed response failed after it started
    #[error("Stream failed: {0}")]
    Stream(String),

    /// Connection-level failure
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The client configuration is unusable
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl VisionError {
    /// Shorthand for a field validation failure
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        VisionError::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Whether replaying the same request may succeed
    ///
    /// Timeouts, connection failures and 5xx answers are transient. Local
    /// validation, decode failures and client-side 4xx answers are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            VisionError::Timeout { .. } => true,
            VisionError::ApiRequest { status, .. } => *status >= 500,
            VisionError::Transport(e) => !e.is_builder() && !e.is_decode() && !e.is_status(),
            VisionError::Validation { .. }
            | VisionError::InvalidImage(_)
            | VisionError::Decode { .. }
            | VisionError::Stream(_)
            | VisionError::Config(_) => false,
        }
    }

    /// Whether the failure happened before any network activity
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            VisionError::Validation { .. } | VisionError::InvalidImage(_) | VisionError::Config(_)
        )
    }
}

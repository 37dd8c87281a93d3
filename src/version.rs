// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
// Version information for the vision client

/// Client name sent in the `User-Agent` header
pub const CLIENT_NAME: &str = "moondream-rust";

/// Semantic version number
pub const VERSION_NUMBER: &str = env!("CARGO_PKG_VERSION");

/// Operations supported by this client
pub const OPERATIONS: &[&str] = &["caption", "query", "detect", "point", "segment"];

/// Get formatted version string for logging
pub fn get_version_string() -> String {
    format!("{} {}", CLIENT_NAME, VERSION_NUMBER)
}

/// Value of the `User-Agent` header
pub fn user_agent() -> String {
    format!("{}/{}", CLIENT_NAME, VERSION_NUMBER)
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Transport layer: endpoint selection and HTTP exchange
//!
//! This module provides:
//! - Endpoint families (local server, cloud) behind one trait
//! - A dispatcher enforcing deadlines and retrying transient failures
//! - Streamed bodies with an inactivity deadline

pub mod body;
pub mod dispatcher;
pub mod endpoint;

pub use body::BodyStream;
pub use dispatcher::{Dispatcher, ResponseBody};
pub use endpoint::{select_endpoint, CloudEndpoint, Endpoint, LocalEndpoint, AUTH_HEADER};

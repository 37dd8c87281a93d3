// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod operations;

use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::config::{ClientConfig, DEFAULT_RETRIES, DEFAULT_TIMEOUT_MS};

/// Moondream vision client
#[derive(Parser, Debug)]
#[command(name = "moondream")]
#[command(version)]
#[command(about = "Run vision-language inferences against a local or cloud endpoint", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Endpoint selection shared by every command
#[derive(Args, Debug)]
pub struct ConnectionArgs {
    /// Cloud API key (can also be set via MOONDREAM_API_KEY env var)
    #[arg(long, global = true, env = "MOONDREAM_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Local inference server URL, e.g. http://localhost:2020/v1
    #[arg(long, global = true, env = "MOONDREAM_API_URL")]
    pub api_url: Option<String>,

    /// Per-exchange timeout in milliseconds
    #[arg(long, global = true, env = "MOONDREAM_TIMEOUT_MS", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub timeout_ms: u64,

    /// Retries for transient failures
    #[arg(long, global = true, env = "MOONDREAM_RETRIES", default_value_t = DEFAULT_RETRIES)]
    pub retries: u32,
}

impl ConnectionArgs {
    pub fn to_config(&self) -> ClientConfig {
        ClientConfig {
            api_key: self.api_key.clone(),
            api_url: self.api_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            retries: self.retries,
            ..ClientConfig::default()
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Caption an image
    Caption(operations::CaptionArgs),

    /// Ask a question about an image
    Query(operations::QueryArgs),

    /// Detect objects as bounding boxes
    Detect(operations::ObjectArgs),

    /// Locate objects as points
    Point(operations::ObjectArgs),

    /// Segment an object
    Segment(operations::SegmentArgs),

    /// Check that the endpoint is reachable
    Health,
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    let config = cli.connection.to_config();
    match cli.command {
        Commands::Caption(args) => operations::caption(config, args).await,
        Commands::Query(args) => operations::query(config, args).await,
        Commands::Detect(args) => operations::detect(config, args).await,
        Commands::Point(args) => operations::point(config, args).await,
        Commands::Segment(args) => operations::segment(config, args).await,
        Commands::Health => operations::health(config).await,
    }
}

// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::Args;
use futures::StreamExt;
use tracing::info;

use crate::config::ClientConfig;
use crate::vision::request::{
    CaptionRequest, DetectRequest, Length, PointRequest, QueryRequest, SamplingSettings,
    SegmentRequest, SpatialRef,
};
use crate::vision::types::{SegmentOutput, TextResult};
use crate::vision::{ImageInput, VlClient};

/// Arguments for the caption command
#[derive(Args, Debug)]
pub struct CaptionArgs {
    /// Image file
    pub image: PathBuf,

    /// Caption length (short/normal/long)
    #[arg(long, default_value = "normal")]
    pub length: Length,

    /// Print the caption as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Maximum number of tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

/// Arguments for the query command
#[derive(Args, Debug)]
pub struct QueryArgs {
    /// Image file
    pub image: PathBuf,

    /// Question to ask
    pub question: String,

    /// Ask the model to explain its answer
    #[arg(long)]
    pub reasoning: bool,

    /// Print the answer as it is generated
    #[arg(long)]
    pub stream: bool,

    /// Maximum number of tokens to generate
    #[arg(long)]
    pub max_tokens: Option<u32>,
}

/// Arguments for the detect and point commands
#[derive(Args, Debug)]
pub struct ObjectArgs {
    /// Image file
    pub image: PathBuf,

    /// Object to look for
    pub object: String,
}

/// Arguments for the segment command
#[derive(Args, Debug)]
pub struct SegmentArgs {
    /// Image file
    pub image: PathBuf,

    /// Object to segment
    pub object: String,

    /// Seed point or box as comma-separated coordinates, e.g. 0.5,0.5
    #[arg(long = "ref", value_delimiter = ';')]
    pub spatial_refs: Vec<String>,

    /// Print path updates as they arrive
    #[arg(long)]
    pub stream: bool,
}

async fn connect(config: ClientConfig, image: &Path) -> Result<(VlClient, ImageInput)> {
    let client = VlClient::new(config)?;
    info!("Using {} endpoint", client.endpoint_name());
    let image = ImageInput::from_path(image)
        .await
        .with_context(|| format!("cannot load {}", image.display()))?;
    Ok((client, image))
}

fn settings(max_tokens: Option<u32>) -> Option<SamplingSettings> {
    max_tokens.map(SamplingSettings::with_max_tokens)
}

/// Print a text result, fragment by fragment when streamed
async fn print_text(result: TextResult) -> Result<()> {
    match result {
        TextResult::Complete(text) => println!("{}", text),
        TextResult::Streaming(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(fragment) = stream.next().await {
                write!(stdout, "{}", fragment?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
            if let Some(reasoning) = stream.reasoning() {
                println!("Reasoning: {}", reasoning.text);
            }
        }
    }
    Ok(())
}

pub async fn caption(config: ClientConfig, args: CaptionArgs) -> Result<()> {
    let (client, image) = connect(config, &args.image).await?;
    let mut request = CaptionRequest::new(image)
        .with_length(args.length)
        .with_stream(args.stream);
    if let Some(settings) = settings(args.max_tokens) {
        request = request.with_settings(settings);
    }
    let output = client.caption(request).await?;
    print_text(output.caption).await
}

pub async fn query(config: ClientConfig, args: QueryArgs) -> Result<()> {
    let (client, image) = connect(config, &args.image).await?;
    let mut request = QueryRequest::new(image, args.question).with_stream(args.stream);
    if args.reasoning {
        request = request.with_reasoning(true);
    }
    if let Some(settings) = settings(args.max_tokens) {
        request = request.with_settings(settings);
    }
    let output = client.query(request).await?;
    let reasoning = output.reasoning.clone();
    print_text(output.answer).await?;
    if let Some(reasoning) = reasoning {
        println!("Reasoning: {}", reasoning.text);
    }
    Ok(())
}

pub async fn detect(config: ClientConfig, args: ObjectArgs) -> Result<()> {
    let (client, image) = connect(config, &args.image).await?;
    let output = client.detect(DetectRequest::new(image, args.object)).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn point(config: ClientConfig, args: ObjectArgs) -> Result<()> {
    let (client, image) = connect(config, &args.image).await?;
    let output = client.point(PointRequest::new(image, args.object)).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn segment(config: ClientConfig, args: SegmentArgs) -> Result<()> {
    let spatial_refs = parse_spatial_refs(&args.spatial_refs)?;
    let (client, image) = connect(config, &args.image).await?;
    let mut request = SegmentRequest::new(image, args.object).with_stream(args.stream);
    if !spatial_refs.is_empty() {
        request = request.with_spatial_refs(spatial_refs);
    }

    match client.segment(request).await? {
        SegmentOutput::Complete(segmentation) => {
            println!("{}", serde_json::to_string_pretty(&segmentation)?);
        }
        SegmentOutput::Streaming(mut stream) => {
            while let Some(update) = stream.next().await {
                println!("{}", serde_json::to_string(&update?)?);
            }
        }
    }
    Ok(())
}

pub async fn health(config: ClientConfig) -> Result<()> {
    let client = VlClient::new(config)?;
    if client.health_check().await {
        println!("{} endpoint is healthy", client.endpoint_name());
        Ok(())
    } else {
        Err(anyhow!("{} endpoint is not healthy", client.endpoint_name()))
    }
}

fn parse_spatial_refs(values: &[String]) -> Result<Vec<SpatialRef>> {
    values
        .iter()
        .map(|value| {
            let coordinates = value
                .split(',')
                .map(|c| c.trim().parse::<f64>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("invalid spatial ref '{}'", value))?;
            Ok(SpatialRef::from_slice(&coordinates)?)
        })
        .collect()
}

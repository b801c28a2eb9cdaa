//! Offline adapter: composite two image files into a PNG on disk.

use std::path::PathBuf;

use anyhow::{anyhow, Context};
use image::DynamicImage;
use tracing::info;

use crate::codec::{decode_image_bytes, encode_png};
use crate::placement::parse_placement_response;
use crate::state::AppState;
use crate::utils::timing::RequestTimer;

use super::process::render;

#[derive(Debug, Clone, PartialEq)]
pub struct ComposeArgs {
    pub interior: PathBuf,
    pub artwork: PathBuf,
    pub output: PathBuf,
    pub keep_alpha: bool,
    pub placement_json: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeSummary {
    pub width: u32,
    pub height: u32,
    pub bytes_written: usize,
}

pub fn compose_usage() -> &'static str {
    "Usage: cargo run -- compose --interior <path> --artwork <path> --output <path> [--keep-alpha] [--placement-json <json>]"
}

pub fn parse_compose_args(args: &[String]) -> anyhow::Result<Option<ComposeArgs>> {
    if args.get(1).map(|value| value.as_str()) != Some("compose") {
        return Ok(None);
    }

    let mut interior: Option<PathBuf> = None;
    let mut artwork: Option<PathBuf> = None;
    let mut output: Option<PathBuf> = None;
    let mut keep_alpha = false;
    let mut placement_json = None;

    let mut index = 2;
    while index < args.len() {
        match args[index].as_str() {
            "--interior" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --interior"))?;
                interior = Some(PathBuf::from(value));
            }
            "--artwork" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --artwork"))?;
                artwork = Some(PathBuf::from(value));
            }
            "--output" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --output"))?;
                output = Some(PathBuf::from(value));
            }
            "--placement-json" => {
                index += 1;
                let value = args
                    .get(index)
                    .ok_or_else(|| anyhow!("Missing value for --placement-json"))?;
                placement_json = Some(value.clone());
            }
            "--keep-alpha" => {
                keep_alpha = true;
            }
            "--help" | "-h" => {
                return Err(anyhow!(compose_usage()));
            }
            other => {
                return Err(anyhow!(
                    "Unknown compose argument: {other}\n{}",
                    compose_usage()
                ));
            }
        }
        index += 1;
    }

    Ok(Some(ComposeArgs {
        interior: interior.ok_or_else(|| anyhow!("--interior is required"))?,
        artwork: artwork.ok_or_else(|| anyhow!("--artwork is required"))?,
        output: output.ok_or_else(|| anyhow!("--output is required"))?,
        keep_alpha,
        placement_json,
    }))
}

pub async fn run_compose(state: &AppState, args: ComposeArgs) -> anyhow::Result<ComposeSummary> {
    let mut timer = RequestTimer::start("cli");

    let interior_bytes = tokio::fs::read(&args.interior)
        .await
        .with_context(|| format!("Failed to read {}", args.interior.display()))?;
    let artwork_bytes = tokio::fs::read(&args.artwork)
        .await
        .with_context(|| format!("Failed to read {}", args.artwork.display()))?;
    let interior = decode_image_bytes(interior_bytes)
        .with_context(|| format!("Invalid interior image {}", args.interior.display()))?;
    let artwork = decode_image_bytes(artwork_bytes)
        .with_context(|| format!("Invalid artwork image {}", args.artwork.display()))?;
    timer.stage("decode");

    let placement = args
        .placement_json
        .as_deref()
        .map(parse_placement_response);
    if let Some(placement) = placement {
        info!("Using placement from --placement-json: {:?}", placement);
    }

    let mut state = state.clone();
    state.options.keep_alpha |= args.keep_alpha;

    let composed: DynamicImage = render(&state, interior, artwork, placement, &mut timer).await?;
    let (width, height) = (composed.width(), composed.height());
    let png = encode_png(&composed)?;
    timer.stage("encode");

    tokio::fs::write(&args.output, &png)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    info!(
        "Wrote {}x{} composite to {} ({} bytes)",
        width,
        height,
        args.output.display(),
        png.len()
    );

    Ok(ComposeSummary {
        width,
        height,
        bytes_written: png.len(),
    })
}

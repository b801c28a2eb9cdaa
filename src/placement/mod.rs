mod parse;

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::llm::{MediaFile, VisionModel};

pub use parse::parse_placement_response;

/// Where and how to lay the artwork over the interior photo.
///
/// `x` is the horizontal centre of the artwork and `y` its vertical anchor, in
/// interior pixels. `wall_height` only shapes the drop shadow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: i64,
    pub y: i64,
    pub scale: f64,
    pub rotation: f64,
    pub wall_height: i64,
}

impl Default for Placement {
    fn default() -> Self {
        Self {
            x: 960,
            y: 324,
            scale: 0.8,
            rotation: 0.0,
            wall_height: 600,
        }
    }
}

/// Asks a vision model for a placement and never fails: every model problem
/// degrades to [`Placement::default`].
#[derive(Clone)]
pub struct PlacementResolver {
    model: Option<Arc<dyn VisionModel>>,
    timeout: Option<Duration>,
}

impl PlacementResolver {
    pub fn new(model: Arc<dyn VisionModel>) -> Self {
        Self {
            model: Some(model),
            timeout: None,
        }
    }

    /// A resolver that always answers with the default placement.
    pub fn offline() -> Self {
        Self {
            model: None,
            timeout: None,
        }
    }

    /// Bounds the model call; `None` waits for as long as the model takes.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn resolve(
        &self,
        prompt: &str,
        interior: &MediaFile,
        artwork: &MediaFile,
    ) -> Placement {
        let Some(model) = self.model.as_ref() else {
            warn!("No vision model configured; using default placement.");
            return Placement::default();
        };

        let images = [interior.clone(), artwork.clone()];
        let call = model.generate_text(prompt, &images);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(result) => result,
                Err(_) => Err(anyhow::anyhow!("timed out after {:?}", limit)),
            },
            None => call.await,
        };

        match outcome {
            Ok(text) => {
                let placement = parse_placement_response(&text);
                info!(
                    model = model.model_name(),
                    x = placement.x,
                    y = placement.y,
                    scale = placement.scale,
                    rotation = placement.rotation,
                    wall_height = placement.wall_height,
                    "Resolved placement"
                );
                placement
            }
            Err(err) => {
                warn!(
                    "Vision model {} failed: {err}; using default placement.",
                    model.model_name()
                );
                Placement::default()
            }
        }
    }
}

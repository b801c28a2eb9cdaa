//! Test doubles shared by the adapter tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage};

use crate::codec::image_to_base64_png;
use crate::compositor::CompositeOptions;
use crate::llm::{MediaFile, VisionModel};
use crate::placement::PlacementResolver;
use crate::state::AppState;

pub struct FakeModel {
    reply: std::result::Result<String, String>,
    pub calls: AtomicUsize,
}

impl FakeModel {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VisionModel for FakeModel {
    async fn generate_text(&self, _prompt: &str, images: &[MediaFile]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(images.len(), 2);
        assert!(images.iter().all(|image| image.mime_type == "image/png"));
        self.reply.clone().map_err(|message| anyhow::anyhow!(message))
    }

    fn model_name(&self) -> &str {
        "fake"
    }
}

pub fn test_state(model: Arc<FakeModel>) -> AppState {
    AppState::new(PlacementResolver::new(model), CompositeOptions::default())
}

pub fn png_base64(width: u32, height: u32, colour: Rgb<u8>) -> String {
    let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, colour));
    image_to_base64_png(&image).expect("encode test png")
}

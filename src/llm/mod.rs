pub mod gemini;
pub mod media;

use anyhow::Result;
use async_trait::async_trait;

pub use gemini::GeminiVisionModel;
pub use media::MediaFile;

/// A generative model that answers a text prompt about a set of images.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Sends the prompt and images, returning the model's free-form text.
    async fn generate_text(&self, prompt: &str, images: &[MediaFile]) -> Result<String>;

    /// Model identifier used in logs.
    fn model_name(&self) -> &str;
}

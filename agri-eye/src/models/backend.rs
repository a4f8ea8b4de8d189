//! Backend abstraction over vision-language model runtimes

use crate::error::VisionError;
use async_trait::async_trait;
use image::RgbImage;

/// Instruction sent with every frame
pub const PROMPT: &str = "Identify the crop status in the image. Select ONE category from: \
[Healthy, Disease, Pest, Unknown]. Do not explain. Just output the category word.";

/// Sampling parameters for a chat request
#[derive(Debug, Clone, PartialEq)]
pub struct Sampling {
    pub enabled: bool,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            enabled: true,
            temperature: 0.7,
            max_tokens: 16,
        }
    }
}

/// A model that answers one question about one image
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare the model for inference. Called once before the first chat.
    async fn load(&self) -> Result<(), VisionError>;

    /// Single-turn chat: one user message holding the image and the prompt
    async fn chat(&self, image: &RgbImage, prompt: &str, sampling: &Sampling) -> Result<String, VisionError>;
}

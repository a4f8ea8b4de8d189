//! Backend for servers speaking the OpenAI chat completions API
//! (vLLM, llama.cpp server, Ollama, ...)

use super::backend::{Sampling, VisionBackend};
use crate::config::ModelConfig;
use crate::error::VisionError;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

const JPEG_QUALITY: u8 = 90;
const MAX_ERROR_BODY: usize = 500;

pub struct OpenAiCompatibleBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompatibleBackend {
    pub fn new(config: &ModelConfig) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone().filter(|key| !key.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.header("Authorization", format!("Bearer {}", key)),
            None => request,
        }
    }

    /// Chat request body with the image inlined as a JPEG data URL
    pub fn request_body(&self, image: &RgbImage, prompt: &str, sampling: &Sampling) -> Result<Value, VisionError> {
        let data_url = format!("data:image/jpeg;base64,{}", STANDARD.encode(encode_rgb_jpeg(image)?));

        let mut body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": data_url } },
                    { "type": "text", "text": prompt },
                ],
            }],
            "max_tokens": sampling.max_tokens,
        });

        if sampling.enabled {
            body["temperature"] = json!(sampling.temperature.clamp(0.0, 2.0));
        } else {
            body["temperature"] = json!(0.0);
        }

        Ok(body)
    }
}

#[async_trait]
impl VisionBackend for OpenAiCompatibleBackend {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn load(&self) -> Result<(), VisionError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| VisionError::Model(format!("Model server at {} unreachable: {}", self.base_url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(VisionError::Model(format!("{} returned HTTP {}", url, status)));
        }

        let json: Value = response.json().await?;
        let served = parse_model_ids(&json);
        debug!("Model server lists {:?}", served);

        if !served.is_empty() && !served.iter().any(|id| id == &self.model) {
            return Err(VisionError::Model(format!(
                "Model {} is not served by {} (available: {})",
                self.model,
                self.base_url,
                served.join(", ")
            )));
        }

        Ok(())
    }

    async fn chat(&self, image: &RgbImage, prompt: &str, sampling: &Sampling) -> Result<String, VisionError> {
        let body = self.request_body(image, prompt, sampling)?;

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .authorize(self.client.post(&url))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text: String = text.chars().take(MAX_ERROR_BODY).collect();
            return Err(VisionError::Inference(format!("HTTP {}: {}", status, text)));
        }

        let json: Value = response.json().await?;
        parse_chat_content(&json)
    }
}

fn encode_rgb_jpeg(image: &RgbImage) -> Result<Vec<u8>, VisionError> {
    let mut bytes = Vec::new();
    let (width, height) = image.dimensions();
    JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY).encode(
        image.as_raw(),
        width,
        height,
        ColorType::Rgb8,
    )?;
    Ok(bytes)
}

fn parse_model_ids(json: &Value) -> Vec<String> {
    json.get("data")
        .and_then(|d| d.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(|id| id.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// First choice's message content
fn parse_chat_content(json: &Value) -> Result<String, VisionError> {
    let choices = json
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| VisionError::Inference("Invalid response format: no choices array".to_string()))?;

    let choice = choices
        .first()
        .ok_or_else(|| VisionError::Inference("No choices in response".to_string()))?;

    choice["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VisionError::Inference("Choice has no text content".to_string()))
}

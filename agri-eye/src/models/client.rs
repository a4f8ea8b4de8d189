//! Inference client wrapping one vision-language backend

use super::backend::{Sampling, VisionBackend, PROMPT};
use crate::error::VisionError;
use image::{DynamicImage, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};

/// Returned by [`InferenceClient::predict`] before [`InferenceClient::load`] succeeded
pub const ERROR_NOT_LOADED: &str = "Error: Model not loaded. Call load() first.";
/// Returned by [`InferenceClient::predict`] when the backend call fails
pub const ERROR_DURING_INFERENCE: &str = "Error during inference.";

/// Wraps a single model. No retries, no batching.
pub struct InferenceClient {
    backend: Arc<dyn VisionBackend>,
    sampling: Sampling,
    loaded: AtomicBool,
    load_lock: Mutex<()>,
}

impl InferenceClient {
    pub fn new(backend: Arc<dyn VisionBackend>) -> Self {
        Self::with_sampling(backend, Sampling::default())
    }

    pub fn with_sampling(backend: Arc<dyn VisionBackend>, sampling: Sampling) -> Self {
        Self {
            backend,
            sampling,
            loaded: AtomicBool::new(false),
            load_lock: Mutex::new(()),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn sampling(&self) -> &Sampling {
        &self.sampling
    }

    /// Materialise the model. Errors propagate; a failed load leaves the
    /// client unloaded. Calling again after success is a no-op.
    pub async fn load(&self) -> Result<(), VisionError> {
        let _guard = self.load_lock.lock().await;
        if self.is_loaded() {
            return Ok(());
        }

        info!("Loading model via {} backend", self.backend.name());
        if let Err(e) = self.backend.load().await {
            error!("Critical error loading model: {}", e);
            return Err(e);
        }

        self.loaded.store(true, Ordering::Release);
        info!("Model loaded");
        Ok(())
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    /// Run one inference and return the raw answer
    pub async fn try_predict(&self, image: &DynamicImage) -> Result<String, VisionError> {
        let rgb = image.to_rgb8();
        self.try_predict_rgb(&rgb).await
    }

    pub(crate) async fn try_predict_rgb(&self, image: &RgbImage) -> Result<String, VisionError> {
        if !self.is_loaded() {
            return Err(VisionError::Model("model not loaded".to_string()));
        }
        self.backend.chat(image, PROMPT, &self.sampling).await
    }

    /// Like [`try_predict`](Self::try_predict) but never fails: errors come
    /// back as [`ERROR_NOT_LOADED`] or [`ERROR_DURING_INFERENCE`].
    pub async fn predict(&self, image: &DynamicImage) -> String {
        if !self.is_loaded() {
            return ERROR_NOT_LOADED.to_string();
        }

        match self.try_predict(image).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Inference error: {}", e);
                ERROR_DURING_INFERENCE.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::MockVisionBackend;

    fn red_square() -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(224, 224, image::Rgb([255, 0, 0])))
    }

    #[tokio::test]
    async fn test_predict_before_load() {
        let mut backend = MockVisionBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_chat().never();

        let client = InferenceClient::new(Arc::new(backend));
        assert!(!client.is_loaded());
        assert_eq!(client.predict(&red_square()).await, ERROR_NOT_LOADED);
    }

    #[tokio::test]
    async fn test_predict_returns_raw_answer() {
        let mut backend = MockVisionBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_load().times(1).returning(|| Ok(()));
        backend
            .expect_chat()
            .withf(|image, prompt, sampling| {
                image.dimensions() == (224, 224)
                    && prompt == PROMPT
                    && sampling.enabled
                    && (sampling.temperature - 0.7).abs() < f32::EPSILON
            })
            .times(1)
            .returning(|_, _, _| Ok("Healthy.".to_string()));

        let client = InferenceClient::new(Arc::new(backend));
        client.load().await.unwrap();
        // Second load is a no-op
        client.load().await.unwrap();

        assert_eq!(client.predict(&red_square()).await, "Healthy.");
    }

    #[tokio::test]
    async fn test_predict_converts_to_rgb() {
        let mut backend = MockVisionBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_load().returning(|| Ok(()));
        backend
            .expect_chat()
            .withf(|image, _, _| image.get_pixel(0, 0).0 == [10, 20, 30])
            .returning(|_, _, _| Ok("Pest".to_string()));

        let client = InferenceClient::new(Arc::new(backend));
        client.load().await.unwrap();

        let rgba = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(4, 4, image::Rgba([10, 20, 30, 128])));
        assert_eq!(client.predict(&rgba).await, "Pest");
    }

    #[tokio::test]
    async fn test_inference_failure_yields_sentinel() {
        let mut backend = MockVisionBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_load().returning(|| Ok(()));
        backend
            .expect_chat()
            .returning(|_, _, _| Err(VisionError::Inference("CUDA out of memory".to_string())));

        let client = InferenceClient::new(Arc::new(backend));
        client.load().await.unwrap();

        assert_eq!(client.predict(&red_square()).await, ERROR_DURING_INFERENCE);
        assert!(client.try_predict(&red_square()).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_load_stays_unloaded() {
        let mut backend = MockVisionBackend::new();
        backend.expect_name().return_const("mock");
        backend
            .expect_load()
            .returning(|| Err(VisionError::Model("weights missing".to_string())));

        let client = InferenceClient::new(Arc::new(backend));
        let err = client.load().await.unwrap_err();
        assert!(err.to_string().contains("weights missing"));
        assert!(!client.is_loaded());
        assert_eq!(client.predict(&red_square()).await, ERROR_NOT_LOADED);
    }
}

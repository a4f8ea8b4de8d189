//! Error types for agri-eye

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("Video error: {0}")]
    Video(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("OpenCV error: {0}")]
    OpenCv(String),
}

impl From<opencv::Error> for VisionError {
    fn from(err: opencv::Error) -> Self {
        VisionError::OpenCv(err.message)
    }
}

impl From<config::ConfigError> for VisionError {
    fn from(err: config::ConfigError) -> Self {
        VisionError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vision_error_display() {
        let err = VisionError::Video("Test error".to_string());
        assert!(err.to_string().contains("Video error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_vision_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let vision_err: VisionError = io_err.into();
        match vision_err {
            VisionError::Io(_) => {}
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_vision_error_from_opencv() {
        let cv_err = opencv::Error::new(0, "bad mat".to_string());
        let vision_err: VisionError = cv_err.into();
        match vision_err {
            VisionError::OpenCv(msg) => assert_eq!(msg, "bad mat"),
            _ => panic!("Expected OpenCv error"),
        }
    }

    #[test]
    fn test_vision_error_from_config() {
        let err: VisionError = config::ConfigError::Message("missing key".to_string()).into();
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("missing key"));
    }
}

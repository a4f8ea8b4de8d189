//! Configuration for agri-eye

use crate::error::VisionError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings for the vision-language model endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API (without the trailing route)
    pub endpoint: String,
    /// Model identifier as served by the endpoint
    pub model: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Sampling temperature
    pub temperature: f32,
    /// Upper bound on generated tokens; the answer is a single word
    pub max_tokens: u32,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8000/v1".to_string(),
            model: "MiniCPM-Llama3-V-2_5".to_string(),
            api_key: None,
            temperature: 0.7,
            max_tokens: 16,
            timeout_secs: 120,
        }
    }
}

/// Dashboard listener
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6006,
        }
    }
}

/// Patrol system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgriConfig {
    /// Source video replayed as the robot camera feed
    pub video_path: PathBuf,
    /// Annotated video written by the offline simulation
    pub output_path: PathBuf,
    /// TrueType font with CJK glyphs for the HUD
    pub font_path: PathBuf,
    /// Frames between two inference dispatches
    pub think_interval: u64,
    /// Sleep between frames so the stream plays at the source frame rate
    pub pace_to_source: bool,
    /// FourCC of the output video codec
    pub output_fourcc: String,
    pub model: ModelConfig,
    pub server: ServerConfig,
}

impl Default for AgriConfig {
    fn default() -> Self {
        Self {
            video_path: PathBuf::from("demo_video.mp4"),
            output_path: PathBuf::from("output_pro_hud.mp4"),
            font_path: PathBuf::from("SimHei.ttf"),
            think_interval: 5,
            pace_to_source: true,
            output_fourcc: "mp4v".to_string(),
            model: ModelConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

impl AgriConfig {
    /// Load configuration: defaults, then an optional TOML file, then
    /// `AGRI__*` environment variables (e.g. `AGRI__MODEL__ENDPOINT`).
    pub fn load(path: Option<&Path>) -> Result<Self, VisionError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&AgriConfig::default())?);

        if let Some(path) = path {
            if !path.exists() {
                return Err(VisionError::Config(format!(
                    "Config file {:?} does not exist",
                    path
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        let config: AgriConfig = builder
            .add_source(
                config::Environment::with_prefix("AGRI")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate().map_err(VisionError::Config)?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.think_interval == 0 {
            return Err("Think interval must be at least 1 frame".to_string());
        }

        if self.model.endpoint.trim().is_empty() {
            return Err("Model endpoint must not be empty".to_string());
        }

        if !self.model.endpoint.starts_with("http://") && !self.model.endpoint.starts_with("https://") {
            return Err("Model endpoint must be an http(s) URL".to_string());
        }

        if self.model.model.trim().is_empty() {
            return Err("Model name must not be empty".to_string());
        }

        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err("Temperature must be between 0 and 2".to_string());
        }

        if self.model.max_tokens == 0 {
            return Err("max_tokens must be non-zero".to_string());
        }

        if self.model.timeout_secs == 0 {
            return Err("Model timeout must be non-zero".to_string());
        }

        if self.output_fourcc.len() != 4 || !self.output_fourcc.is_ascii() {
            return Err("Output FourCC must be exactly 4 ASCII characters".to_string());
        }

        if self.server.port == 0 {
            return Err("Server port must be non-zero".to_string());
        }

        Ok(())
    }

    /// FourCC characters for `VideoWriter::fourcc`
    pub fn fourcc_chars(&self) -> [char; 4] {
        let mut chars = ['m', 'p', '4', 'v'];
        for (slot, c) in chars.iter_mut().zip(self.output_fourcc.chars()) {
            *slot = c;
        }
        chars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_default() {
        let config = AgriConfig::default();
        assert_eq!(config.think_interval, 5);
        assert_eq!(config.video_path, PathBuf::from("demo_video.mp4"));
        assert_eq!(config.font_path, PathBuf::from("SimHei.ttf"));
        assert_eq!(config.output_fourcc, "mp4v");
        assert_eq!(config.server.port, 6006);
        assert!((config.model.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_think_interval_zero() {
        let mut config = AgriConfig::default();
        config.think_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_temperature_range() {
        let mut config = AgriConfig::default();
        config.model.temperature = 2.5;
        assert!(config.validate().is_err());

        config.model.temperature = -0.1;
        assert!(config.validate().is_err());

        config.model.temperature = 0.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_endpoint() {
        let mut config = AgriConfig::default();
        config.model.endpoint = String::new();
        assert!(config.validate().is_err());

        config.model.endpoint = "ftp://models.local".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_fourcc() {
        let mut config = AgriConfig::default();
        config.output_fourcc = "mp4".to_string();
        assert!(config.validate().is_err());

        config.output_fourcc = "avc1".to_string();
        assert!(config.validate().is_ok());
        assert_eq!(config.fourcc_chars(), ['a', 'v', 'c', '1']);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let config = AgriConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: AgriConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.think_interval, config.think_interval);
        assert_eq!(parsed.model.model, config.model.model);
        assert_eq!(parsed.server.host, config.server.host);
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "think_interval = 30").unwrap();
        writeln!(file, "[model]").unwrap();
        writeln!(file, "model = \"minicpm-v\"").unwrap();

        let config = AgriConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.think_interval, 30);
        assert_eq!(config.model.model, "minicpm-v");
        // Untouched keys keep their defaults
        assert_eq!(config.server.port, 6006);
    }

    #[test]
    fn test_config_load_missing_file() {
        let result = AgriConfig::load(Some(Path::new("/nonexistent/agri.toml")));
        assert!(matches!(result, Err(VisionError::Config(_))));
    }

    #[test]
    fn test_config_load_rejects_invalid_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "think_interval = 0").unwrap();
        assert!(AgriConfig::load(Some(file.path())).is_err());
    }
}

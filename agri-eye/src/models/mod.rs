//! Vision-language model access

pub mod backend;
pub mod client;
pub mod openai;

pub use backend::{Sampling, VisionBackend, PROMPT};
pub use client::{InferenceClient, ERROR_DURING_INFERENCE, ERROR_NOT_LOADED};
pub use openai::OpenAiCompatibleBackend;

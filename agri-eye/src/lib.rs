//! agri-eye: vision core for the AgriPatrol demo
//!
//! Replays a video as a robot camera feed, asks a vision-language model
//! whether the crop in view is healthy, diseased or infested, and renders
//! the resulting driving decision as a heads-up display.
//!
//! The streaming [`PatrolLoop`] backs the web dashboard; [`Simulation`]
//! writes an annotated video offline.

pub mod config;
pub mod decision;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod overlay;
pub mod patrol;
pub mod record;
pub mod simulation;
pub mod telemetry;
pub mod video;
pub mod utils;

pub use config::{AgriConfig, ModelConfig, ServerConfig};
pub use decision::{Decision, Outcome};
pub use dispatcher::{DispatchOutcome, InferenceDispatcher};
pub use error::VisionError;
pub use models::{InferenceClient, OpenAiCompatibleBackend, VisionBackend};
pub use overlay::{HudPanel, HudRenderer};
pub use patrol::{PatrolContext, PatrolLoop, PatrolUpdate};
pub use record::{DecisionBoard, DecisionRecord};
pub use simulation::{Simulation, SimulationReport};
pub use telemetry::{LogEntry, PatrolLog, SensorSnapshot};
pub use video::{Frame, FrameSource, StillFrameSource, VideoFileSource, VideoSink};

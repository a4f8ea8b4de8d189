//! Offline patrol: annotate a video file with blocking inference

use crate::config::AgriConfig;
use crate::decision::{Decision, Outcome};
use crate::error::VisionError;
use crate::models::InferenceClient;
use crate::overlay::{HudPanel, HudRenderer};
use crate::utils::mat_to_rgb_image;
use crate::video::{FrameSource, VideoFileSource, VideoSink};
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tracing::info;

const DEFAULT_FPS: f64 = 25.0;

pub const STATE_INITIALIZING: &str = "初始化 (Initializing)";
pub const STATE_THINKING: &str = "思考中 (AI Thinking...)";
pub const STATE_SCANNING: &str = "巡航中 (Scanning)";

/// Summary of a finished simulation
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub frames: u64,
    pub inferences: u64,
    /// 1-based ids of the frames that ran inference
    pub think_frames: Vec<u64>,
    pub last_outcome: Option<Outcome>,
    /// HUD drawn on the last frame
    pub final_panel: Option<HudPanel>,
}

/// HUD contents carried between frames
#[derive(Debug, Clone)]
struct SimulationState {
    state: &'static str,
    diagnosis: String,
    advice: String,
    command: String,
    latency_ms: f64,
    outcome: Option<Outcome>,
}

impl Default for SimulationState {
    fn default() -> Self {
        Self {
            state: STATE_INITIALIZING,
            diagnosis: "等待数据...".to_string(),
            advice: "系统启动中...".to_string(),
            command: "[等待指令]".to_string(),
            latency_ms: 0.0,
            outcome: None,
        }
    }
}

impl SimulationState {
    fn apply(&mut self, decision: &Decision, latency_ms: f64) {
        self.diagnosis = decision.outcome.label_bilingual();
        self.advice = decision.advice.to_string();
        self.command = format!("[指令] {}", decision.command);
        self.latency_ms = latency_ms;
        self.outcome = Some(decision.outcome);
    }

    fn panel(&self, frame_id: u64) -> HudPanel {
        HudPanel {
            frame_id,
            state: self.state.to_string(),
            scanning: self.state == STATE_SCANNING,
            diagnosis: self.diagnosis.clone(),
            advice: self.advice.clone(),
            command: self.command.clone(),
            latency_ms: self.latency_ms,
            outcome: self.outcome,
        }
    }
}

/// Reads every frame once, runs inference inline every `think_interval`
/// frames and writes the annotated result
pub struct Simulation {
    source: Box<dyn FrameSource>,
    sink: VideoSink,
    renderer: HudRenderer,
    client: Arc<InferenceClient>,
    think_interval: u64,
}

impl Simulation {
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: VideoSink,
        renderer: HudRenderer,
        client: Arc<InferenceClient>,
        think_interval: u64,
    ) -> Self {
        Self {
            source,
            sink,
            renderer,
            client,
            think_interval: think_interval.max(1),
        }
    }

    /// Open the configured input video and output file
    pub fn from_config(config: &AgriConfig, client: Arc<InferenceClient>) -> Result<Self, VisionError> {
        let source = VideoFileSource::open(&config.video_path, false)?;
        let fps = source.frame_rate().unwrap_or(DEFAULT_FPS);
        let size = source
            .frame_size()
            .ok_or_else(|| VisionError::Video("Input video reports no frame size".to_string()))?;

        let sink = VideoSink::create(&config.output_path, config.fourcc_chars(), fps, size)?;
        let renderer = HudRenderer::new(&config.font_path);

        Ok(Self::new(Box::new(source), sink, renderer, client, config.think_interval))
    }

    /// Run to the end of the input. Must not be called from an async context.
    pub fn run(mut self, runtime: &Handle) -> Result<SimulationReport, VisionError> {
        if !self.client.is_loaded() {
            return Err(VisionError::Model("model not loaded".to_string()));
        }

        info!("Simulation started (think interval: {} frames)", self.think_interval);
        let mut hud = SimulationState::default();
        let mut frames = 0u64;
        let mut think_frames = Vec::new();
        let mut final_panel = None;

        while let Some(frame) = self.source.next_frame()? {
            frames += 1;

            if frames % self.think_interval == 0 {
                hud.state = STATE_THINKING;
                let image = DynamicImage::ImageRgb8(mat_to_rgb_image(&frame.image)?);

                let started = Instant::now();
                let answer = runtime.block_on(self.client.predict(&image));
                let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                think_frames.push(frames);

                hud.apply(&Decision::from_label(&answer), latency_ms);
                info!("Frame {}: AI thinking -> {}", frames, hud.diagnosis);
            } else {
                hud.state = STATE_SCANNING;
            }

            let panel = hud.panel(frames);
            let annotated = self.renderer.render(&frame.image, &panel)?;
            self.sink.write(&annotated)?;
            final_panel = Some(panel);
        }

        self.sink.finish()?;
        info!("Simulation complete: {} frames, {} inferences", frames, think_frames.len());

        Ok(SimulationReport {
            frames,
            inferences: think_frames.len() as u64,
            think_frames,
            last_outcome: hud.outcome,
            final_panel,
        })
    }
}

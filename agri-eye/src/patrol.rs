//! Streaming patrol loop

use crate::dispatcher::InferenceDispatcher;
use crate::error::VisionError;
use crate::overlay::{HudPanel, HudRenderer};
use crate::record::DecisionBoard;
use crate::telemetry::{LogEntry, PatrolLog, SensorSnapshot};
use crate::utils::mat_to_rgb_image;
use crate::video::FrameSource;
use opencv::core::Mat;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

pub const STATUS_PATROLLING: &str = "🟢 正在巡航 (Patrolling)";
pub const STATUS_NOT_INITIALIZED: &str = "⚠️ 请先点击 [1. 初始化系统]";
pub const STATUS_FINISHED: &str = "🔴 任务结束";
pub const TELEMETRY_OFFLINE: &str = "传感器离线";
pub const TELEMETRY_STOPPED: &str = "已停止";

const HUD_STATE: &str = "AI 监测中 (流畅模式)";

/// State shared by the patrol loop, its inference tasks and whoever
/// controls the run
#[derive(Debug, Clone, Default)]
pub struct PatrolContext {
    board: DecisionBoard,
    running: Arc<AtomicBool>,
}

impl PatrolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn board(&self) -> &DecisionBoard {
        &self.board
    }

    /// Raise the run flag. Returns `false` if a run was already active.
    pub fn start(&self) -> bool {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Clear the run flag. In-flight inference is left to finish.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// One step of the patrol stream
pub struct PatrolUpdate {
    /// Annotated frame; `None` for status-only updates
    pub frame: Option<Mat>,
    pub frame_id: Option<u64>,
    pub telemetry: String,
    pub logs: Vec<LogEntry>,
    pub status: String,
}

impl PatrolUpdate {
    fn status_only(telemetry: &str, logs: Vec<LogEntry>, status: &str) -> Self {
        Self {
            frame: None,
            frame_id: None,
            telemetry: telemetry.to_string(),
            logs,
            status: status.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.frame.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Fresh,
    Running,
    Done,
}

/// Lazily pulls frames, dispatches inference every `think_interval` frames
/// and renders the latest decision. Blocking; run it on a dedicated thread.
pub struct PatrolLoop {
    source: Box<dyn FrameSource>,
    renderer: HudRenderer,
    dispatcher: InferenceDispatcher,
    context: PatrolContext,
    think_interval: u64,
    pace: bool,
    sensors: SensorSnapshot,
    log: PatrolLog,
    count: u64,
    phase: Phase,
    last_emit: Option<Instant>,
}

impl PatrolLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        renderer: HudRenderer,
        dispatcher: InferenceDispatcher,
        context: PatrolContext,
        think_interval: u64,
    ) -> Self {
        Self {
            source,
            renderer,
            dispatcher,
            context,
            think_interval: think_interval.max(1),
            pace: true,
            sensors: SensorSnapshot::default(),
            log: PatrolLog::new(),
            count: 0,
            phase: Phase::Fresh,
            last_emit: None,
        }
    }

    /// Sleep between frames to match the source frame rate
    pub fn with_pacing(mut self, pace: bool) -> Self {
        self.pace = pace;
        self
    }

    pub fn frames_seen(&self) -> u64 {
        self.count
    }

    pub fn dispatcher(&self) -> &InferenceDispatcher {
        &self.dispatcher
    }

    /// End the run. The flag is cleared here too, so a loop that ends on
    /// exhaustion or error does not leave the context looking busy.
    fn finish(&mut self) -> PatrolUpdate {
        self.phase = Phase::Done;
        self.context.stop();
        info!("Patrol finished after {} frames", self.count);
        PatrolUpdate::status_only(TELEMETRY_STOPPED, self.log.rows(), STATUS_FINISHED)
    }

    fn step(&mut self) -> Result<Option<PatrolUpdate>, VisionError> {
        let frame = match self.source.next_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };
        self.count += 1;

        let is_think_frame = self.count % self.think_interval == 0;
        if is_think_frame && self.context.is_running() {
            match mat_to_rgb_image(&frame.image) {
                Ok(rgb) => {
                    self.dispatcher.dispatch(rgb, self.count);
                }
                Err(e) => warn!("Skipping inference on frame {}: {}", self.count, e),
            }
        }

        let record = self.context.board().snapshot();

        if is_think_frame {
            self.log.record(self.count, &record.diagnosis, &record.command);
        }
        self.sensors.tick(record.target_speed);

        let mut panel = HudPanel::new(self.count, HUD_STATE, &record);
        panel.advice = format!("目标速度: {:.1} m/s", record.target_speed);
        let annotated = self.renderer.render(&frame.image, &panel)?;

        self.pace_frame();

        Ok(Some(PatrolUpdate {
            frame: Some(annotated),
            frame_id: Some(self.count),
            telemetry: self.sensors.render(),
            logs: self.log.rows(),
            status: STATUS_PATROLLING.to_string(),
        }))
    }

    fn pace_frame(&mut self) {
        let fps = self.source.frame_rate().filter(|fps| fps.is_finite() && *fps > 0.0);
        if let (true, Some(fps)) = (self.pace, fps) {
            let budget = Duration::from_secs_f64(1.0 / fps);
            if let Some(elapsed) = self.last_emit.map(|t| t.elapsed()) {
                if let Some(remaining) = budget.checked_sub(elapsed) {
                    std::thread::sleep(remaining);
                }
            }
        }
        self.last_emit = Some(Instant::now());
    }
}

impl Iterator for PatrolLoop {
    type Item = PatrolUpdate;

    fn next(&mut self) -> Option<Self::Item> {
        match self.phase {
            Phase::Done => return None,
            Phase::Fresh => {
                if !self.dispatcher.client().is_loaded() {
                    warn!("Patrol requested before the model was loaded");
                    self.phase = Phase::Done;
                    self.context.stop();
                    return Some(PatrolUpdate::status_only(
                        TELEMETRY_OFFLINE,
                        Vec::new(),
                        STATUS_NOT_INITIALIZED,
                    ));
                }
                info!("Patrol started (think interval: {} frames)", self.think_interval);
                self.phase = Phase::Running;
            }
            Phase::Running => {}
        }

        if !self.context.is_running() {
            debug!("Stop flag observed");
            return Some(self.finish());
        }

        match self.step() {
            Ok(Some(update)) => Some(update),
            Ok(None) => {
                info!("Frame source exhausted");
                Some(self.finish())
            }
            Err(e) => {
                error!("Patrol loop failed on frame {}: {}", self.count + 1, e);
                Some(self.finish())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backend::MockVisionBackend;
    use crate::models::InferenceClient;
    use crate::utils::solid_mat;
    use crate::video::StillFrameSource;
    use opencv::prelude::*;
    use tokio::runtime::Runtime;

    fn client(loaded: bool, runtime: &Runtime) -> Arc<InferenceClient> {
        let mut backend = MockVisionBackend::new();
        backend.expect_name().return_const("mock");
        backend.expect_load().returning(|| Ok(()));
        backend.expect_chat().returning(|_, _, _| Ok("Pest".to_string()));

        let client = Arc::new(InferenceClient::new(Arc::new(backend)));
        if loaded {
            runtime.block_on(client.load()).unwrap();
        }
        client
    }

    fn patrol(runtime: &Runtime, loaded: bool, looping: bool, interval: u64) -> (PatrolLoop, PatrolContext) {
        let context = PatrolContext::new();
        let dispatcher = InferenceDispatcher::new(client(loaded, runtime), context.board().clone(), runtime.handle().clone());
        let frame = solid_mat(96, 96, (20.0, 160.0, 20.0)).unwrap();
        let source = StillFrameSource::new(vec![frame], looping).unwrap();
        let patrol = PatrolLoop::new(
            Box::new(source),
            HudRenderer::with_fallback_font(),
            dispatcher,
            context.clone(),
            interval,
        )
        .with_pacing(false);
        (patrol, context)
    }

    #[test]
    fn test_context_start_is_exclusive() {
        let context = PatrolContext::new();
        assert!(context.start());
        assert!(!context.start());
        context.stop();
        assert!(!context.is_running());
        assert!(context.start());
    }

    #[test]
    fn test_unloaded_model_yields_single_update() {
        let runtime = Runtime::new().unwrap();
        let (patrol, context) = patrol(&runtime, false, true, 1);
        context.start();

        let updates: Vec<_> = patrol.collect();
        assert_eq!(updates.len(), 1);
        assert!(updates[0].frame.is_none());
        assert_eq!(updates[0].telemetry, TELEMETRY_OFFLINE);
        assert_eq!(updates[0].status, STATUS_NOT_INITIALIZED);
        assert!(!context.is_running());
    }

    #[test]
    fn test_stop_ends_with_one_terminal_update() {
        let runtime = Runtime::new().unwrap();
        let (mut patrol, context) = patrol(&runtime, true, true, 5);
        context.start();

        for expected in 1..=3 {
            let update = patrol.next().unwrap();
            assert_eq!(update.frame_id, Some(expected));
            assert_eq!(update.status, STATUS_PATROLLING);
            let frame = update.frame.unwrap();
            assert_eq!((frame.cols(), frame.rows()), (96, 96));
        }

        context.stop();
        let last = patrol.next().unwrap();
        assert!(last.is_terminal());
        assert_eq!(last.telemetry, TELEMETRY_STOPPED);
        assert_eq!(last.status, STATUS_FINISHED);
        assert!(patrol.next().is_none());
        assert!(patrol.next().is_none());
    }

    #[test]
    fn test_exhausted_source_finishes() {
        let runtime = Runtime::new().unwrap();
        let (patrol, context) = patrol(&runtime, true, false, 5);
        context.start();

        let updates: Vec<_> = patrol.collect();
        assert_eq!(updates.len(), 2);
        assert!(updates[0].frame.is_some());
        assert_eq!(updates[1].status, STATUS_FINISHED);
        assert!(!context.is_running());
        assert!(context.start());
    }

    #[test]
    fn test_log_rows_on_think_frames() {
        let runtime = Runtime::new().unwrap();
        let (mut patrol, context) = patrol(&runtime, true, true, 2);
        context.start();

        let mut last = None;
        for _ in 0..6 {
            last = patrol.next();
        }
        let update = last.unwrap();
        let frames: Vec<u64> = update.logs.iter().map(|row| row.frame).collect();
        assert_eq!(frames, vec![6, 4, 2]);
        assert!(update.telemetry.starts_with("🔋 电池: "));
        assert!(patrol.dispatcher().stats().dispatched >= 1);
    }

    /// Source that fails on the first read
    struct BrokenSource;

    impl FrameSource for BrokenSource {
        fn next_frame(&mut self) -> Result<Option<crate::video::Frame>, VisionError> {
            Err(VisionError::Video("contains no decodable frames".to_string()))
        }

        fn frame_rate(&self) -> Option<f64> {
            None
        }

        fn frame_size(&self) -> Option<(i32, i32)> {
            None
        }
    }

    #[test]
    fn test_source_failure_clears_run_flag() {
        let runtime = Runtime::new().unwrap();
        let context = PatrolContext::new();
        let dispatcher = InferenceDispatcher::new(client(true, &runtime), context.board().clone(), runtime.handle().clone());
        let patrol = PatrolLoop::new(
            Box::new(BrokenSource),
            HudRenderer::with_fallback_font(),
            dispatcher,
            context.clone(),
            1,
        );
        assert!(context.start());

        let updates: Vec<_> = patrol.collect();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, STATUS_FINISHED);
        assert!(!context.is_running());
        assert!(context.start());
    }

    #[test]
    fn test_zero_frame_rate_is_not_paced() {
        let runtime = Runtime::new().unwrap();
        let context = PatrolContext::new();
        let dispatcher = InferenceDispatcher::new(client(true, &runtime), context.board().clone(), runtime.handle().clone());
        let frame = solid_mat(64, 64, (0.0, 0.0, 0.0)).unwrap();
        let source = StillFrameSource::new(vec![frame], true).unwrap().with_frame_rate(0.0);
        let mut patrol = PatrolLoop::new(
            Box::new(source),
            HudRenderer::with_fallback_font(),
            dispatcher,
            context.clone(),
            5,
        )
        .with_pacing(true);
        context.start();

        for _ in 0..3 {
            assert!(patrol.next().unwrap().frame.is_some());
        }
        context.stop();
    }
}

//! Dashboard state: model lifecycle, patrol worker and frame fan-out

use agri_eye::patrol::{STATUS_NOT_INITIALIZED, STATUS_PATROLLING};
use agri_eye::utils::encode_jpeg;
use agri_eye::{
    AgriConfig, FrameSource, HudRenderer, InferenceClient, InferenceDispatcher, LogEntry, PatrolContext,
    PatrolLoop, PatrolUpdate, VideoFileSource, VisionError,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

pub const STATUS_ONLINE: &str = "✅ 系统就绪 (System Online)";
pub const STATUS_ALREADY_ONLINE: &str = "系统已在运行 (System Already Online)";
pub const STATUS_STOP_SENT: &str = "🔴 停止指令已发送";

const FRAME_BUFFER_SIZE: usize = 16;
const STREAM_JPEG_QUALITY: i32 = 80;

/// One message pushed to dashboard clients
#[derive(Debug, Clone, Serialize)]
pub struct DashboardFrame {
    /// Base64 JPEG of the annotated frame
    pub frame: Option<String>,
    pub telemetry: String,
    pub logs: Vec<LogEntry>,
    pub status: String,
}

impl DashboardFrame {
    pub fn from_update(update: &PatrolUpdate) -> Self {
        let frame = update.frame.as_ref().and_then(|mat| match encode_jpeg(mat, STREAM_JPEG_QUALITY) {
            Ok(bytes) => Some(STANDARD.encode(bytes)),
            Err(e) => {
                warn!("Dropping frame {:?} from stream: {}", update.frame_id, e);
                None
            }
        });

        Self {
            frame,
            telemetry: update.telemetry.clone(),
            logs: update.logs.clone(),
            status: update.status.clone(),
        }
    }
}

struct DashboardInner {
    config: AgriConfig,
    context: PatrolContext,
    dispatcher: InferenceDispatcher,
    frames: broadcast::Sender<Arc<DashboardFrame>>,
    latest: RwLock<Option<Arc<DashboardFrame>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Shared handler state
#[derive(Clone)]
pub struct DashboardState {
    inner: Arc<DashboardInner>,
}

impl DashboardState {
    pub fn new(config: AgriConfig, client: Arc<InferenceClient>, runtime: Handle) -> Self {
        let context = PatrolContext::new();
        let dispatcher = InferenceDispatcher::new(client, context.board().clone(), runtime);
        let (frames, _) = broadcast::channel(FRAME_BUFFER_SIZE);

        Self {
            inner: Arc::new(DashboardInner {
                config,
                context,
                dispatcher,
                frames,
                latest: RwLock::new(None),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &AgriConfig {
        &self.inner.config
    }

    pub fn context(&self) -> &PatrolContext {
        &self.inner.context
    }

    pub fn dispatcher(&self) -> &InferenceDispatcher {
        &self.inner.dispatcher
    }

    pub fn is_model_loaded(&self) -> bool {
        self.inner.dispatcher.client().is_loaded()
    }

    pub fn is_patrolling(&self) -> bool {
        self.inner
            .worker
            .lock()
            .as_ref()
            .map_or(false, |worker| !worker.is_finished())
    }

    /// Load the model. Safe to call repeatedly.
    pub async fn init(&self) -> String {
        if self.is_model_loaded() {
            return STATUS_ALREADY_ONLINE.to_string();
        }

        match self.inner.dispatcher.client().load().await {
            Ok(()) => STATUS_ONLINE.to_string(),
            Err(e) => {
                error!("System initialisation failed: {}", e);
                format!("❌ 初始化失败: {}", e)
            }
        }
    }

    /// Start the patrol worker on the blocking pool. The video file is opened
    /// off the async workers.
    pub async fn start(&self) -> String {
        if let Some(status) = self.claim_run() {
            return status;
        }

        let path = self.inner.config.video_path.clone();
        let opened = tokio::task::spawn_blocking(move || VideoFileSource::open(&path, true))
            .await
            .map_err(|e| VisionError::Video(format!("open task failed: {}", e)))
            .and_then(|result| result);

        match opened {
            Ok(source) => self.launch(Box::new(source)),
            Err(e) => {
                self.inner.context.stop();
                error!("Cannot start patrol: {}", e);
                format!("❌ 视频源不可用: {}", e)
            }
        }
    }

    /// Start the patrol worker on an already opened source
    pub fn start_with_source(&self, source: Box<dyn FrameSource>) -> String {
        match self.claim_run() {
            Some(status) => status,
            None => self.launch(source),
        }
    }

    /// Raise the run flag, or return the status explaining why not
    fn claim_run(&self) -> Option<String> {
        if !self.is_model_loaded() {
            self.publish(Arc::new(DashboardFrame {
                frame: None,
                telemetry: agri_eye::patrol::TELEMETRY_OFFLINE.to_string(),
                logs: Vec::new(),
                status: STATUS_NOT_INITIALIZED.to_string(),
            }));
            return Some(STATUS_NOT_INITIALIZED.to_string());
        }

        let worker = self.inner.worker.lock();
        if worker.as_ref().map_or(false, |w| !w.is_finished()) || !self.inner.context.start() {
            return Some(STATUS_ALREADY_ONLINE.to_string());
        }
        None
    }

    fn launch(&self, source: Box<dyn FrameSource>) -> String {
        let config = &self.inner.config;
        let pace = config.pace_to_source && source.frame_rate().is_some();
        let font_path = config.font_path.clone();
        let think_interval = config.think_interval;
        let dispatcher = self.inner.dispatcher.clone();
        let context = self.inner.context.clone();
        let state = self.clone();

        *self.inner.worker.lock() = Some(tokio::task::spawn_blocking(move || {
            let renderer = HudRenderer::new(&font_path);
            let patrol = PatrolLoop::new(source, renderer, dispatcher, context.clone(), think_interval)
                .with_pacing(pace);

            for update in patrol {
                state.publish(Arc::new(DashboardFrame::from_update(&update)));
            }
            context.stop();
            info!("Patrol worker exited");
        }));

        info!("Patrol started on {:?}", config.video_path);
        STATUS_PATROLLING.to_string()
    }

    /// Raise the stop flag; the worker finishes its current frame and exits
    pub fn stop(&self) -> String {
        self.inner.context.stop();
        STATUS_STOP_SENT.to_string()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DashboardFrame>> {
        self.inner.frames.subscribe()
    }

    /// Last message pushed, for clients that connect mid-stream
    pub fn latest(&self) -> Option<Arc<DashboardFrame>> {
        self.inner.latest.read().clone()
    }

    fn publish(&self, frame: Arc<DashboardFrame>) {
        *self.inner.latest.write() = Some(frame.clone());
        // No receivers is fine
        let _ = self.inner.frames.send(frame);
    }
}

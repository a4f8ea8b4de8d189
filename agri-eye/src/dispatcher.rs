//! Fire-and-forget inference dispatch with a single in-flight slot

use crate::decision::Decision;
use crate::models::InferenceClient;
use crate::record::{DecisionBoard, DecisionRecord};
use image::RgbImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of offering a frame to the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    /// A previous inference is still running; the frame was dropped
    Busy,
}

/// Counters since the dispatcher was created
#[derive(Debug, Default)]
pub struct DispatchStats {
    dispatched: AtomicU64,
    dropped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DispatchCounts {
    pub dispatched: u64,
    pub dropped: u64,
    pub completed: u64,
    pub failed: u64,
}

impl DispatchStats {
    pub fn counts(&self) -> DispatchCounts {
        DispatchCounts {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Runs inference off the frame loop. At most one request is in flight;
/// frames offered while it runs are dropped, never queued. Only the spawned
/// task writes the decision board.
#[derive(Clone)]
pub struct InferenceDispatcher {
    client: Arc<InferenceClient>,
    board: DecisionBoard,
    permit: Arc<Semaphore>,
    runtime: Handle,
    stats: Arc<DispatchStats>,
}

impl InferenceDispatcher {
    pub fn new(client: Arc<InferenceClient>, board: DecisionBoard, runtime: Handle) -> Self {
        Self {
            client,
            board,
            permit: Arc::new(Semaphore::new(1)),
            runtime,
            stats: Arc::new(DispatchStats::default()),
        }
    }

    /// Offer a frame. Never blocks.
    pub fn dispatch(&self, image: RgbImage, frame_id: u64) -> DispatchOutcome {
        self.spawn(image, frame_id).map_or(DispatchOutcome::Busy, |_| DispatchOutcome::Dispatched)
    }

    /// Like [`dispatch`](Self::dispatch), returning the task handle
    pub fn spawn(&self, image: RgbImage, frame_id: u64) -> Option<JoinHandle<()>> {
        let permit = match self.permit.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                debug!("Inference busy, dropping frame {}", frame_id);
                return None;
            }
        };

        self.stats.dispatched.fetch_add(1, Ordering::Relaxed);
        let client = self.client.clone();
        let board = self.board.clone();
        let stats = self.stats.clone();

        Some(self.runtime.spawn(async move {
            let _permit = permit;
            let started = Instant::now();

            match client.try_predict_rgb(&image).await {
                Ok(answer) => {
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    let decision = Decision::from_label(&answer);
                    info!(
                        "Frame {}: model answered {:?} -> {} ({:.0}ms)",
                        frame_id,
                        answer.trim(),
                        decision.outcome,
                        latency_ms
                    );
                    board.publish(DecisionRecord::from_decision(&decision, latency_ms, frame_id));
                    stats.completed.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => {
                    warn!("Inference on frame {} failed, keeping previous decision: {}", frame_id, e);
                    stats.failed.fetch_add(1, Ordering::Relaxed);
                }
            }
        }))
    }

    /// True while an inference task holds the slot
    pub fn is_busy(&self) -> bool {
        self.permit.available_permits() == 0
    }

    pub fn stats(&self) -> DispatchCounts {
        self.stats.counts()
    }

    pub fn board(&self) -> &DecisionBoard {
        &self.board
    }

    pub fn client(&self) -> &Arc<InferenceClient> {
        &self.client
    }
}

//! Shared decision record

use crate::decision::{Decision, Outcome};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

/// Latest decision shown on the HUD
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub outcome: Option<Outcome>,
    pub diagnosis: String,
    pub command: String,
    pub advice: String,
    pub target_speed: f64,
    pub latency_ms: f64,
    /// Frame the decision was inferred from
    pub frame_id: Option<u64>,
}

impl Default for DecisionRecord {
    fn default() -> Self {
        Self {
            outcome: None,
            diagnosis: "等待数据...".to_string(),
            command: "待命".to_string(),
            advice: "系统启动中...".to_string(),
            target_speed: 0.0,
            latency_ms: 0.0,
            frame_id: None,
        }
    }
}

impl DecisionRecord {
    pub fn from_decision(decision: &Decision, latency_ms: f64, frame_id: u64) -> Self {
        Self {
            outcome: Some(decision.outcome),
            diagnosis: decision.outcome.label_zh().to_string(),
            command: decision.command.to_string(),
            advice: decision.advice.to_string(),
            target_speed: decision.target_speed,
            latency_ms,
            frame_id: Some(frame_id),
        }
    }
}

/// Single-slot board holding the current record. Writers replace the whole
/// record under the lock, so readers never see a mix of two writes.
#[derive(Debug, Clone, Default)]
pub struct DecisionBoard {
    slot: Arc<Mutex<DecisionRecord>>,
}

impl DecisionBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current record
    pub fn snapshot(&self) -> DecisionRecord {
        self.slot.lock().clone()
    }

    /// Replace the record, returning the previous one
    pub fn publish(&self, record: DecisionRecord) -> DecisionRecord {
        std::mem::replace(&mut *self.slot.lock(), record)
    }

    /// Restore the initial waiting state
    pub fn reset(&self) {
        self.publish(DecisionRecord::default());
    }
}

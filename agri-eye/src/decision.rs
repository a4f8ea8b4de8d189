//! Crop outcome parsing and the fixed decision table

use crate::error::VisionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Crop status reported by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Healthy,
    Disease,
    Pest,
    Unknown,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Healthy,
        Outcome::Disease,
        Outcome::Pest,
        Outcome::Unknown,
    ];

    /// Parse a raw model answer. Anything that is not exactly one of the
    /// four category words maps to `Unknown`.
    pub fn classify(raw: &str) -> Self {
        raw.parse().unwrap_or(Outcome::Unknown)
    }

    pub fn label_en(self) -> &'static str {
        match self {
            Outcome::Healthy => "Healthy",
            Outcome::Disease => "Disease",
            Outcome::Pest => "Pest",
            Outcome::Unknown => "Unknown",
        }
    }

    pub fn label_zh(self) -> &'static str {
        match self {
            Outcome::Healthy => "健康",
            Outcome::Disease => "病害",
            Outcome::Pest => "虫害",
            Outcome::Unknown => "未知",
        }
    }

    /// `健康 (Healthy)`
    pub fn label_bilingual(self) -> String {
        format!("{} ({})", self.label_zh(), self.label_en())
    }

    /// Disease and pest findings both halt the robot
    pub fn requires_stop(self) -> bool {
        matches!(self, Outcome::Disease | Outcome::Pest)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label_en())
    }
}

impl FromStr for Outcome {
    type Err = VisionError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let word = raw
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric());

        Outcome::ALL
            .into_iter()
            .find(|outcome| outcome.label_en().eq_ignore_ascii_case(word))
            .ok_or_else(|| {
                let preview: String = raw.chars().take(64).collect();
                VisionError::Processing(format!("Unrecognised crop status: {:?}", preview))
            })
    }
}

/// Control decision derived from an outcome
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: Outcome,
    pub command: &'static str,
    pub target_speed: f64,
    pub advice: &'static str,
}

pub const COMMAND_CRUISE: &str = "全速巡航";
pub const COMMAND_STOP_SPRAY: &str = "停车/喷洒";
pub const COMMAND_SLOW_OBSERVE: &str = "减速观察";

impl Decision {
    pub fn for_outcome(outcome: Outcome) -> Self {
        let (command, target_speed) = match outcome {
            Outcome::Healthy => (COMMAND_CRUISE, 1.5),
            Outcome::Disease | Outcome::Pest => (COMMAND_STOP_SPRAY, 0.0),
            Outcome::Unknown => (COMMAND_SLOW_OBSERVE, 0.5),
        };

        Self {
            outcome,
            command,
            target_speed,
            advice: expert_advice(outcome),
        }
    }

    /// Map a raw model answer straight to a decision
    pub fn from_label(raw: &str) -> Self {
        Self::for_outcome(Outcome::classify(raw))
    }
}

/// Expert knowledge base entry for an outcome
pub fn expert_advice(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Healthy => "作物生长状况良好，建议保持当前水肥管理。",
        Outcome::Disease => "检测到疑似病害！建议立即停车采样，并喷洒杀菌剂。",
        Outcome::Pest => "检测到害虫活动！建议释放捕食螨或进行物理诱捕。",
        Outcome::Unknown => "目标不明确，请人工接管或靠近观察。",
    }
}

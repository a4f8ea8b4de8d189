//! Mock robot telemetry and the rolling diagnosis log

use serde::Serialize;
use std::collections::VecDeque;

const BATTERY_DRAIN_PER_FRAME: f64 = 0.01;

/// Simulated sensor readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorSnapshot {
    pub battery: f64,
    pub speed: f64,
    pub lat: f64,
    pub lon: f64,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            battery: 98.0,
            speed: 0.0,
            lat: 34.0522,
            lon: 118.2437,
        }
    }
}

impl SensorSnapshot {
    /// Advance one frame: drain the battery and follow the commanded speed.
    pub fn tick(&mut self, target_speed: f64) {
        self.battery -= BATTERY_DRAIN_PER_FRAME;
        if self.battery < 0.0 {
            self.battery = 100.0;
        }
        self.speed = target_speed;
    }

    /// Telemetry panel text
    pub fn render(&self) -> String {
        format!(
            "🔋 电池: {}%\n🚀 速度: {:.1} m/s\n📍 坐标: ({}, {})",
            self.battery as i64, self.speed, self.lat, self.lon
        )
    }
}

/// One row of the diagnosis log
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogEntry {
    /// Wall clock time `HH:MM:SS`
    pub time: String,
    pub frame: u64,
    pub diagnosis: String,
    pub command: String,
}

pub const LOG_CAPACITY: usize = 10;

/// Newest-first log holding at most [`LOG_CAPACITY`] rows
#[derive(Debug, Clone, Default)]
pub struct PatrolLog {
    entries: VecDeque<LogEntry>,
}

impl PatrolLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, frame: u64, diagnosis: &str, command: &str) {
        let time = chrono::Local::now().format("%H:%M:%S").to_string();
        self.push(LogEntry {
            time,
            frame,
            diagnosis: diagnosis.to_string(),
            command: command.to_string(),
        });
    }

    pub fn push(&mut self, entry: LogEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(LOG_CAPACITY);
    }

    pub fn rows(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::command::DeviceCommand;

/// 自适应调度（每个设备一份，新调度完全取代旧调度）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveSchedule {
    pub device_id: String,

    /// 按顺序排列的定时动作
    pub actions: Vec<ScheduledAction>,

    /// 置信度（0.0 - 1.0）
    pub confidence: f64,

    pub last_updated: DateTime<Utc>,
}

impl AdaptiveSchedule {
    pub fn new(device_id: impl Into<String>, actions: Vec<ScheduledAction>) -> Self {
        Self {
            device_id: device_id.into(),
            actions,
            confidence: 1.0,
            last_updated: Utc::now(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }
}

/// 定时动作
///
/// `time` 为本地时间 `HH:MM`，`weekdays` 取值 0-6（0 = 周日）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledAction {
    pub time: String,
    pub command: DeviceCommand,
    pub weekdays: BTreeSet<u8>,
}

impl ScheduledAction {
    pub fn new(
        time: impl Into<String>,
        command: DeviceCommand,
        weekdays: impl IntoIterator<Item = u8>,
    ) -> Self {
        Self {
            time: time.into(),
            command,
            weekdays: weekdays.into_iter().collect(),
        }
    }

    /// 每天执行
    pub fn daily(time: impl Into<String>, command: DeviceCommand) -> Self {
        Self::new(time, command, 0..=6)
    }

    /// 解析 `HH:MM`
    pub fn time_of_day(&self) -> Result<NaiveTime, chrono::ParseError> {
        NaiveTime::parse_from_str(&self.time, "%H:%M")
    }
}

/// 覆盖原因
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OverrideReason {
    Manual,
    Occupancy,
    Anomaly,
}

/// 调度覆盖记录（仅在回调分发期间存在）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduleOverride {
    pub device_id: String,
    pub command: DeviceCommand,
    pub timestamp: DateTime<Utc>,
    pub reason: OverrideReason,
}

impl ScheduleOverride {
    pub fn new(device_id: impl Into<String>, command: DeviceCommand, reason: OverrideReason) -> Self {
        Self {
            device_id: device_id.into(),
            command,
            timestamp: Utc::now(),
            reason,
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::device::PowerRange;

/// 异常事件（追加到设备历史，作为审计日志不可修改）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnomalyEvent {
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    /// 记录时的正常范围快照
    pub normal_range: PowerRange,
    pub actual_value: f64,
    pub action_taken: String,
}

impl AnomalyEvent {
    pub const ACTION_SHUTDOWN: &'static str = "device_shutdown";

    pub fn shutdown(device_id: impl Into<String>, normal_range: PowerRange, actual_value: f64) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp: Utc::now(),
            normal_range,
            actual_value,
            action_taken: Self::ACTION_SHUTDOWN.to_string(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

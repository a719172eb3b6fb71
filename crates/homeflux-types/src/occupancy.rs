use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 占用检测结果（每次检测调用生成）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OccupancyResult {
    pub location: String,
    pub occupied: bool,
    /// 置信度（0.0 - 1.0），低于 0.5 视为未知
    pub confidence: f64,
    pub person_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl OccupancyResult {
    pub const MIN_TRUSTED_CONFIDENCE: f64 = 0.5;

    pub fn new(location: impl Into<String>, occupied: bool, confidence: f64, person_count: u32) -> Self {
        Self {
            location: location.into(),
            occupied,
            confidence,
            person_count,
            timestamp: Utc::now(),
        }
    }

    /// 无法判断时的低置信度结果
    pub fn unknown(location: impl Into<String>) -> Self {
        Self::new(location, false, 0.0, 0)
    }

    pub fn is_trusted(&self) -> bool {
        self.confidence >= Self::MIN_TRUSTED_CONFIDENCE
    }
}

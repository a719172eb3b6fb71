use homeflux_types::PowerRange;
use serde::{Deserialize, Serialize};

/// 功率读数的严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnomalySeverity {
    /// 不超过正常上限
    Normal,
    /// 超过上限，但未达到 `max × multiplier`
    Elevated,
    /// 超过 `max × multiplier`，需要紧急关断
    Critical,
}

impl AnomalySeverity {
    pub fn is_anomaly(&self) -> bool {
        matches!(self, AnomalySeverity::Critical)
    }
}

/// 按正常范围和倍数判定读数级别
pub fn classify(range: &PowerRange, watts: f64, multiplier: f64) -> AnomalySeverity {
    if watts > range.max * multiplier {
        AnomalySeverity::Critical
    } else if watts > range.max {
        AnomalySeverity::Elevated
    } else {
        AnomalySeverity::Normal
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 网关配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GatewayConfig {
    /// 离线指令队列最大长度
    pub queue_max_size: usize,

    /// 设备元数据/状态缓存有效期（毫秒）
    pub cache_ttl_ms: u64,

    /// 连续失败多少次后判定上游不可用
    pub failure_threshold: u32,

    /// 后台健康检查间隔（毫秒）
    pub health_check_interval_ms: u64,
}

impl GatewayConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            queue_max_size: 100,
            cache_ttl_ms: 300_000,
            failure_threshold: 3,
            health_check_interval_ms: 30_000,
        }
    }
}

/// 异常检测配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AnomalyConfig {
    /// 超过 `max × multiplier` 视为异常
    pub multiplier: f64,

    /// 禁用窗口（秒）
    pub disable_window_secs: u64,

    /// 窗口内触发禁用的异常次数
    pub disable_count: usize,
}

impl AnomalyConfig {
    pub fn disable_window(&self) -> Duration {
        Duration::from_secs(self.disable_window_secs)
    }
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            multiplier: 1.5,
            disable_window_secs: 24 * 60 * 60,
            disable_count: 3,
        }
    }
}

/// 占用检测配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OccupancyConfig {
    /// 持续无人多久后关闭设备（毫秒）
    pub unoccupied_threshold_ms: u64,

    /// 有效帧的最小字节数
    pub min_frame_bytes: usize,

    /// 平均亮度低于此值视为过暗（0.0 - 1.0）
    pub dark_threshold: f64,

    /// 平均亮度高于此值视为有人（0.0 - 1.0）
    pub presence_threshold: f64,
}

impl OccupancyConfig {
    pub fn unoccupied_threshold(&self) -> Duration {
        Duration::from_millis(self.unoccupied_threshold_ms)
    }
}

impl Default for OccupancyConfig {
    fn default() -> Self {
        Self {
            unoccupied_threshold_ms: 5 * 60 * 1000,
            min_frame_bytes: 64,
            dark_threshold: 0.05,
            presence_threshold: 0.4,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认过滤指令（可被 RUST_LOG 覆盖）
    pub level: String,

    /// 是否输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_accessors() {
        let gateway = GatewayConfig::default();
        assert_eq!(gateway.cache_ttl(), Duration::from_secs(300));
        assert_eq!(gateway.health_check_interval(), Duration::from_secs(30));

        let anomaly = AnomalyConfig::default();
        assert_eq!(anomaly.disable_window(), Duration::from_secs(86_400));

        let occupancy = OccupancyConfig::default();
        assert_eq!(occupancy.unoccupied_threshold(), Duration::from_secs(300));
    }
}

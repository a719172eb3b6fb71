use serde::{Deserialize, Serialize};

use crate::sections::{AnomalyConfig, GatewayConfig, LoggingConfig, OccupancyConfig};

/// 全局配置
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    pub system: SystemConfig,
    pub gateway: GatewayConfig,
    pub anomaly: AnomalyConfig,
    pub occupancy: OccupancyConfig,
    pub logging: LoggingConfig,
}

/// 系统配置
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SystemConfig {
    pub name: String,
    pub version: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "HomeFlux".to_string(),
            version: "0.1.0".to_string(),
        }
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 设备信息
///
/// 由网关缓存刷新维护，设备不会被删除，只会被标记为离线。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    /// 设备 ID（全局唯一，稳定）
    pub id: String,

    /// 设备类型
    pub device_type: DeviceType,

    /// 设备名称
    pub name: String,

    /// 所在位置（房间）
    pub location: String,

    /// 能力集合
    pub capabilities: Vec<String>,

    /// 正常功率范围（注册时确定，异常检测的唯一依据）
    pub normal_power_range: PowerRange,

    /// 是否在线
    pub online: bool,

    /// 最后在线时间
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    /// 创建新设备
    pub fn new(id: impl Into<String>, device_type: DeviceType, power_range: PowerRange) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            device_type,
            location: String::new(),
            capabilities: Vec::new(),
            normal_power_range: power_range,
            online: true,
            last_seen: Some(Utc::now()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        let capability = capability.into();
        if !self.capabilities.contains(&capability) {
            self.capabilities.push(capability);
        }
        self
    }

    /// 更新最后在线时间
    pub fn update_last_seen(&mut self) {
        self.online = true;
        self.last_seen = Some(Utc::now());
    }

    /// 标记为离线
    pub fn mark_offline(&mut self) {
        self.online = false;
    }
}

/// 设备类型
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Plug,
    Thermostat,
    Light,
    Sensor,
    Custom(String),
}

impl DeviceType {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceType::Plug => "plug",
            DeviceType::Thermostat => "thermostat",
            DeviceType::Light => "light",
            DeviceType::Sensor => "sensor",
            DeviceType::Custom(s) => s.as_str(),
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "plug" => DeviceType::Plug,
            "thermostat" => DeviceType::Thermostat,
            "light" => DeviceType::Light,
            "sensor" => DeviceType::Sensor,
            _ => DeviceType::Custom(s.to_string()),
        }
    }
}

/// 正常功率范围（瓦）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PowerRange {
    pub min: f64,
    pub max: f64,
}

impl PowerRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, watts: f64) -> bool {
        watts >= self.min && watts <= self.max
    }
}

/// 电源状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn as_str(&self) -> &str {
        match self {
            PowerState::On => "on",
            PowerState::Off => "off",
        }
    }
}

/// 设备运行状态（临时数据，按需刷新或来自缓存）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceStatus {
    pub device_id: String,
    pub online: bool,
    pub power_state: PowerState,
    /// 当前功率（瓦）
    pub current_watts: Option<f64>,
    pub last_updated: DateTime<Utc>,
}

impl DeviceStatus {
    pub fn new(device_id: impl Into<String>, power_state: PowerState) -> Self {
        Self {
            device_id: device_id.into(),
            online: true,
            power_state,
            current_watts: None,
            last_updated: Utc::now(),
        }
    }

    pub fn with_watts(mut self, watts: f64) -> Self {
        self.current_watts = Some(watts);
        self
    }

    pub fn is_on(&self) -> bool {
        self.power_state == PowerState::On
    }
}

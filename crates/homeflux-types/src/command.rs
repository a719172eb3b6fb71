use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::device::PowerState;

/// 设备指令（不可变值对象）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceCommand {
    /// 指令动作
    pub action: CommandAction,

    /// 指令参数
    #[serde(default, skip_serializing_if = "CommandParams::is_empty")]
    pub params: CommandParams,
}

/// 指令动作
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CommandAction {
    TurnOn,
    TurnOff,
    SetValue,
}

impl CommandAction {
    pub fn as_str(&self) -> &str {
        match self {
            CommandAction::TurnOn => "turn_on",
            CommandAction::TurnOff => "turn_off",
            CommandAction::SetValue => "set_value",
        }
    }

    /// 指令执行成功后设备应处于的电源状态
    pub fn resulting_power_state(&self) -> Option<PowerState> {
        match self {
            CommandAction::TurnOn => Some(PowerState::On),
            CommandAction::TurnOff => Some(PowerState::Off),
            CommandAction::SetValue => None,
        }
    }
}

/// 指令参数
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CommandParams {
    #[serde(flatten)]
    pub data: HashMap<String, serde_json::Value>,
}

impl CommandParams {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
        }
    }

    pub fn insert<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> serde_json::Result<()> {
        self.data.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    pub fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> serde_json::Result<Option<T>> {
        match self.data.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl DeviceCommand {
    pub fn new(action: CommandAction) -> Self {
        Self {
            action,
            params: CommandParams::new(),
        }
    }

    pub fn turn_on() -> Self {
        Self::new(CommandAction::TurnOn)
    }

    pub fn turn_off() -> Self {
        Self::new(CommandAction::TurnOff)
    }

    /// 设定数值（例如温控器目标温度）
    pub fn set_value(key: impl Into<String>, value: f64) -> Self {
        let mut params = CommandParams::new();
        params.data.insert(key.into(), serde_json::Value::from(value));
        Self {
            action: CommandAction::SetValue,
            params,
        }
    }

    pub fn with_params(mut self, params: CommandParams) -> Self {
        self.params = params;
        self
    }
}

/// 上游不可用期间排队的指令
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedCommand {
    pub device_id: String,
    pub command: DeviceCommand,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedCommand {
    pub fn new(device_id: impl Into<String>, command: DeviceCommand) -> Self {
        Self {
            device_id: device_id.into(),
            command,
            enqueued_at: Utc::now(),
        }
    }
}

/// 上游 API 可用性状态（熔断器）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiStatus {
    pub is_available: bool,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
}

impl Default for ApiStatus {
    fn default() -> Self {
        Self {
            is_available: true,
            consecutive_failures: 0,
            last_checked: None,
        }
    }
}

use crate::client::DeviceCloudClient;
use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use homeflux_types::{
    CommandAction, Device, DeviceCommand, DeviceStatus, DeviceType, PowerRange, PowerState,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// 上游调用记录
#[derive(Debug, Clone, PartialEq)]
pub enum UpstreamCall {
    Register { device_id: String },
    Discover,
    Status { device_id: String },
    Command { device_id: String, command: DeviceCommand },
    Subscribe { device_id: String },
}

/// 内存模拟的设备云
///
/// 用于测试和本地联调：可注入故障，并记录所有调用。
#[derive(Clone, Default)]
pub struct SimulatedCloudClient {
    failing: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
    catalog: Arc<RwLock<HashMap<String, Device>>>,
    states: Arc<RwLock<HashMap<String, DeviceStatus>>>,
    calls: Arc<RwLock<Vec<UpstreamCall>>>,
    delivered: Arc<RwLock<Vec<(String, DeviceCommand)>>>,
}

impl SimulatedCloudClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置设备及其初始电源状态
    pub async fn add_device(&self, device: Device, power_state: PowerState) {
        let status = DeviceStatus::new(device.id.clone(), power_state);
        self.states.write().await.insert(device.id.clone(), status);
        self.catalog.write().await.insert(device.id.clone(), device);
    }

    /// 设置是否模拟上游故障
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::SeqCst)
    }

    /// 设置每次上游调用的延迟（按调用完成时的故障状态返回结果）
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms.store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::SeqCst))
    }

    /// 所有调用（含失败的）
    pub async fn calls(&self) -> Vec<UpstreamCall> {
        self.calls.read().await.clone()
    }

    /// 成功送达的指令，按送达顺序
    pub async fn delivered_commands(&self) -> Vec<(String, DeviceCommand)> {
        self.delivered.read().await.clone()
    }

    /// 送达某设备的指令动作
    pub async fn delivered_actions(&self, device_id: &str) -> Vec<CommandAction> {
        self.delivered
            .read()
            .await
            .iter()
            .filter(|(id, _)| id == device_id)
            .map(|(_, cmd)| cmd.action)
            .collect()
    }

    pub async fn power_state(&self, device_id: &str) -> Option<PowerState> {
        self.states.read().await.get(device_id).map(|s| s.power_state)
    }

    pub async fn set_watts(&self, device_id: &str, watts: f64) {
        if let Some(status) = self.states.write().await.get_mut(device_id) {
            status.current_watts = Some(watts);
        }
    }

    pub async fn clear_calls(&self) {
        self.calls.write().await.clear();
        self.delivered.write().await.clear();
    }

    async fn record(&self, call: UpstreamCall) -> anyhow::Result<()> {
        self.calls.write().await.push(call);
        let latency = self.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.is_failing() {
            return Err(anyhow!("simulated device cloud outage"));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceCloudClient for SimulatedCloudClient {
    async fn register_device(&self, device_id: &str, device_type: &DeviceType) -> anyhow::Result<Device> {
        self.record(UpstreamCall::Register {
            device_id: device_id.to_string(),
        })
        .await?;

        let mut catalog = self.catalog.write().await;
        let device = catalog
            .entry(device_id.to_string())
            .or_insert_with(|| {
                Device::new(device_id, device_type.clone(), PowerRange::new(0.0, 100.0))
            })
            .clone();
        drop(catalog);

        self.states
            .write()
            .await
            .entry(device_id.to_string())
            .or_insert_with(|| DeviceStatus::new(device_id, PowerState::Off));

        Ok(device)
    }

    async fn discover_devices(&self) -> anyhow::Result<Vec<Device>> {
        self.record(UpstreamCall::Discover).await?;
        let mut devices: Vec<Device> = self.catalog.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(devices)
    }

    async fn get_device_status(&self, device_id: &str) -> anyhow::Result<DeviceStatus> {
        self.record(UpstreamCall::Status {
            device_id: device_id.to_string(),
        })
        .await?;

        self.states
            .read()
            .await
            .get(device_id)
            .cloned()
            .ok_or_else(|| anyhow!("unknown device: {}", device_id))
    }

    async fn send_command(&self, device_id: &str, command: &DeviceCommand) -> anyhow::Result<()> {
        self.record(UpstreamCall::Command {
            device_id: device_id.to_string(),
            command: command.clone(),
        })
        .await?;

        if let Some(power_state) = command.action.resulting_power_state() {
            let mut states = self.states.write().await;
            let status = states
                .entry(device_id.to_string())
                .or_insert_with(|| DeviceStatus::new(device_id, power_state));
            status.power_state = power_state;
            status.last_updated = Utc::now();
        }

        debug!(device_id = %device_id, action = command.action.as_str(), "Simulated command delivered");
        self.delivered
            .write()
            .await
            .push((device_id.to_string(), command.clone()));
        Ok(())
    }

    async fn subscribe_to_telemetry(&self, device_id: &str) -> anyhow::Result<()> {
        self.record(UpstreamCall::Subscribe {
            device_id: device_id.to_string(),
        })
        .await
    }
}

use async_trait::async_trait;
use homeflux_types::{Device, DeviceCommand, DeviceStatus, DeviceType};

/// 设备云客户端 trait
///
/// 网关是唯一的调用方；任何 `Err` 都计入熔断器的失败次数。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceCloudClient: Send + Sync {
    /// 在云端注册设备
    async fn register_device(&self, device_id: &str, device_type: &DeviceType) -> anyhow::Result<Device>;

    /// 发现账户下的全部设备
    async fn discover_devices(&self) -> anyhow::Result<Vec<Device>>;

    /// 查询设备状态
    async fn get_device_status(&self, device_id: &str) -> anyhow::Result<DeviceStatus>;

    /// 下发指令
    async fn send_command(&self, device_id: &str, command: &DeviceCommand) -> anyhow::Result<()>;

    /// 订阅设备遥测
    async fn subscribe_to_telemetry(&self, device_id: &str) -> anyhow::Result<()>;
}

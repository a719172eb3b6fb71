use crate::error::Result;
use homeflux_anomaly::{AnomalyCheck, AnomalyDetector};
use homeflux_config::{ConfigLoader, GlobalConfig};
use homeflux_gateway::{DeviceCloudClient, DeviceGateway};
use homeflux_occupancy::OccupancyDetector;
use homeflux_schedule::{Clock, ScheduleExecutor, SystemClock};
use homeflux_types::{Device, DeviceType};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 家庭控制器
///
/// 统一入口：所有组件共享同一个设备网关。
pub struct HomeController {
    gateway: Arc<DeviceGateway>,
    schedules: ScheduleExecutor,
    anomalies: AnomalyDetector,
    occupancy: OccupancyDetector,
    shut_down: AtomicBool,
}

impl HomeController {
    pub fn new(config: GlobalConfig, client: Arc<dyn DeviceCloudClient>) -> Self {
        Self::with_clock(config, client, Arc::new(SystemClock))
    }

    /// 使用指定时钟创建（测试中配合模拟时钟）
    pub fn with_clock(
        config: GlobalConfig,
        client: Arc<dyn DeviceCloudClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let gateway = Arc::new(DeviceGateway::new(client, config.gateway.clone()));
        let schedules = ScheduleExecutor::new(gateway.clone(), clock);
        let anomalies = AnomalyDetector::new(gateway.clone(), config.anomaly.clone());
        let occupancy = OccupancyDetector::new(gateway.clone(), config.occupancy.clone());

        info!(system = %config.system.name, version = %config.system.version, "Home controller created");

        Self {
            gateway,
            schedules,
            anomalies,
            occupancy,
            shut_down: AtomicBool::new(false),
        }
    }

    /// 从配置目录加载 `homeflux.toml` 并创建
    pub fn from_config_dir<P: AsRef<Path>>(
        config_dir: P,
        client: Arc<dyn DeviceCloudClient>,
    ) -> anyhow::Result<Self> {
        let config = ConfigLoader::new(config_dir).load_validated()?;
        Ok(Self::new(config, client))
    }

    /// 启动后台任务
    pub async fn start(&self) {
        self.gateway.start_health_check().await;
        info!("Home controller started");
    }

    pub fn gateway(&self) -> &Arc<DeviceGateway> {
        &self.gateway
    }

    pub fn schedules(&self) -> &ScheduleExecutor {
        &self.schedules
    }

    pub fn anomalies(&self) -> &AnomalyDetector {
        &self.anomalies
    }

    pub fn occupancy(&self) -> &OccupancyDetector {
        &self.occupancy
    }

    /// 注册设备：先在网关注册，再以返回的正常功率范围登记到异常检测
    pub async fn register_device(&self, device_id: &str, device_type: DeviceType) -> Result<Device> {
        let device = self.gateway.register_device(device_id, device_type).await?;
        self.anomalies.register_device(device.clone()).await?;
        Ok(device)
    }

    /// 上报功率读数
    ///
    /// 设备因多次异常被禁用自动控制后，暂停其调度。
    pub async fn report_power_reading(&self, device_id: &str, watts: f64) -> Result<AnomalyCheck> {
        let check = self.anomalies.check_for_anomalies(device_id, watts).await?;

        if check.is_anomaly
            && self.anomalies.is_device_disabled(device_id).await
            && self.schedules.get_active_schedule(device_id).await.is_some()
            && !self.schedules.is_schedule_paused(device_id).await
        {
            self.schedules.pause_schedule(device_id).await?;
            warn!(device_id = %device_id, "Schedule paused for disabled device");
        }

        Ok(check)
    }

    /// 关闭所有组件（与依赖顺序相反，可重复调用）
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            debug!("Home controller already shut down");
            return;
        }

        info!("Shutting down home controller...");
        self.occupancy.cleanup().await;
        self.schedules.shutdown().await;
        self.anomalies.shutdown().await;
        self.gateway.shutdown().await;
        info!("Home controller shut down");
    }
}

use crate::cache::DeviceCache;
use crate::client::DeviceCloudClient;
use crate::error::{GatewayError, Result};
use crate::queue::{CommandQueue, QueueStatus};
use chrono::Utc;
use homeflux_config::GatewayConfig;
use homeflux_types::{ApiStatus, Device, DeviceCommand, DeviceStatus, DeviceType, QueuedCommand};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 一次回放的统计
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplayReport {
    pub replayed: usize,
    pub dropped: usize,
    /// 上游仍不可用时留在队列中的数量
    pub remaining: usize,
}

/// 设备指令网关
///
/// 唯一与设备云交互的组件：缓存设备元数据、统计连续失败（熔断器），
/// 上游不可用时将指令放入有界队列，恢复后按 FIFO 回放。
#[derive(Clone)]
pub struct DeviceGateway {
    client: Arc<dyn DeviceCloudClient>,
    config: GatewayConfig,
    cache: DeviceCache,
    queue: CommandQueue,
    api_status: Arc<RwLock<ApiStatus>>,
    replay_lock: Arc<Mutex<()>>,
    health_check: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl DeviceGateway {
    pub fn new(client: Arc<dyn DeviceCloudClient>, config: GatewayConfig) -> Self {
        info!(
            queue_max_size = config.queue_max_size,
            cache_ttl = ?config.cache_ttl(),
            failure_threshold = config.failure_threshold,
            "Device gateway created"
        );

        Self {
            client,
            cache: DeviceCache::new(config.cache_ttl()),
            queue: CommandQueue::new(config.queue_max_size),
            config,
            api_status: Arc::new(RwLock::new(ApiStatus::default())),
            replay_lock: Arc::new(Mutex::new(())),
            health_check: Arc::new(Mutex::new(None)),
        }
    }

    // ========== 设备元数据 ==========

    /// 注册设备
    ///
    /// 上游失败时回退到未过期的缓存，否则返回 `UpstreamUnavailable`。
    pub async fn register_device(&self, device_id: &str, device_type: DeviceType) -> Result<Device> {
        validate_device_id(device_id)?;

        match self.client.register_device(device_id, &device_type).await {
            Ok(device) => {
                self.record_success().await;
                self.cache.put_device(device.clone()).await;
                info!(device_id = %device_id, device_type = device_type.as_str(), "Device registered");
                self.replay_if_pending().await;
                Ok(device)
            }
            Err(e) => {
                self.record_failure(&e).await;
                match self.cache.get_device(device_id).await {
                    Some(device) => {
                        warn!(device_id = %device_id, error = %e, "Registration failed, serving cached device");
                        Ok(device)
                    }
                    None => Err(GatewayError::unavailable(format!(
                        "register {}: {}",
                        device_id, e
                    ))),
                }
            }
        }
    }

    /// 发现设备
    pub async fn discover_devices(&self) -> Result<Vec<Device>> {
        match self.client.discover_devices().await {
            Ok(devices) => {
                self.record_success().await;
                let seen: Vec<String> = devices.iter().map(|d| d.id.clone()).collect();
                for device in &devices {
                    self.cache.put_device(device.clone()).await;
                }
                self.cache.mark_missing_offline(&seen).await;
                debug!(count = devices.len(), "Devices discovered");
                self.replay_if_pending().await;
                Ok(devices)
            }
            Err(e) => {
                self.record_failure(&e).await;
                let cached = self.cache.fresh_devices().await;
                if cached.is_empty() {
                    return Err(GatewayError::unavailable(format!("discover: {}", e)));
                }
                warn!(count = cached.len(), error = %e, "Discovery failed, serving cached devices");
                Ok(cached)
            }
        }
    }

    /// 获取设备状态
    pub async fn get_device_status(&self, device_id: &str) -> Result<DeviceStatus> {
        validate_device_id(device_id)?;

        match self.client.get_device_status(device_id).await {
            Ok(status) => {
                self.record_success().await;
                self.cache.put_status(status.clone()).await;
                self.replay_if_pending().await;
                Ok(status)
            }
            Err(e) => {
                self.record_failure(&e).await;
                match self.cache.get_status(device_id).await {
                    Some(status) => {
                        debug!(device_id = %device_id, "Serving cached device status");
                        Ok(status)
                    }
                    None => Err(GatewayError::unavailable(format!(
                        "status {}: {}",
                        device_id, e
                    ))),
                }
            }
        }
    }

    /// 订阅设备遥测
    pub async fn subscribe_to_telemetry(&self, device_id: &str) -> Result<()> {
        validate_device_id(device_id)?;

        match self.client.subscribe_to_telemetry(device_id).await {
            Ok(()) => {
                self.record_success().await;
                self.replay_if_pending().await;
                Ok(())
            }
            Err(e) => {
                self.record_failure(&e).await;
                Err(GatewayError::unavailable(format!(
                    "subscribe {}: {}",
                    device_id, e
                )))
            }
        }
    }

    // ========== 指令 ==========

    /// 下发指令
    ///
    /// 上游失败不会返回错误：指令进入离线队列。队列非空时新指令排在
    /// 队尾，并用队首指令探测上游，保证同一设备的指令顺序。
    pub async fn send_command(&self, device_id: &str, command: &DeviceCommand) -> Result<()> {
        validate_device_id(device_id)?;

        if !self.queue.is_empty().await {
            self.enqueue(device_id, command).await;
            self.replay_queued_commands().await;
            return Ok(());
        }

        match self.client.send_command(device_id, command).await {
            Ok(()) => {
                self.record_success().await;
                self.apply_to_cache(device_id, command).await;
                debug!(device_id = %device_id, action = command.action.as_str(), "Command sent");
            }
            Err(e) => {
                self.record_failure(&e).await;
                self.enqueue(device_id, command).await;
            }
        }

        Ok(())
    }

    /// 回放离线队列
    ///
    /// 先用队首指令探测上游：失败则保留队列原样；成功则视为恢复，
    /// 按 FIFO 逐条下发其余指令，回放期间失败的指令直接丢弃。
    /// 每条指令在下发完成后才出队，回放被中途取消时指令仍留在队首。
    pub async fn replay_queued_commands(&self) -> ReplayReport {
        let _guard = self.replay_lock.lock().await;
        let mut report = ReplayReport::default();

        let Some((seq, head)) = self.queue.front().await else {
            return report;
        };

        match self.client.send_command(&head.device_id, &head.command).await {
            Ok(()) => {
                self.record_success().await;
                self.queue.remove_front_if(seq).await;
                self.apply_to_cache(&head.device_id, &head.command).await;
                report.replayed += 1;
            }
            Err(e) => {
                self.record_failure(&e).await;
                report.remaining = self.queue.len().await;
                debug!(remaining = report.remaining, "Upstream still unavailable, replay deferred");
                return report;
            }
        }

        while let Some((seq, entry)) = self.queue.front().await {
            let sent = self.client.send_command(&entry.device_id, &entry.command).await;
            self.queue.remove_front_if(seq).await;
            match sent {
                Ok(()) => {
                    self.record_success().await;
                    self.apply_to_cache(&entry.device_id, &entry.command).await;
                    report.replayed += 1;
                }
                Err(e) => {
                    self.record_failure(&e).await;
                    report.dropped += 1;
                    warn!(
                        device_id = %entry.device_id,
                        action = entry.command.action.as_str(),
                        queued_at = %entry.enqueued_at,
                        error = %e,
                        "Replay failed, command dropped"
                    );
                }
            }
        }

        report.remaining = self.queue.len().await;
        info!(
            replayed = report.replayed,
            dropped = report.dropped,
            "Offline command queue replayed"
        );
        report
    }

    // ========== 可观测性 ==========

    pub async fn get_queue_status(&self) -> QueueStatus {
        self.queue.status().await
    }

    /// 按插入顺序列出排队的指令
    pub async fn queued_commands(&self) -> Vec<QueuedCommand> {
        self.queue.snapshot().await
    }

    pub async fn get_api_status(&self) -> ApiStatus {
        self.api_status.read().await.clone()
    }

    pub async fn is_available(&self) -> bool {
        self.api_status.read().await.is_available
    }

    /// 读取缓存中的设备（不访问上游）
    pub async fn cached_device(&self, device_id: &str) -> Option<Device> {
        self.cache.get_device(device_id).await
    }

    // ========== 健康检查 ==========

    /// 启动后台健康检查
    ///
    /// 周期性地调用 `discover_devices` 探测上游，恢复后自动回放队列。
    pub async fn start_health_check(&self) {
        let mut handle = self.health_check.lock().await;
        if handle.is_some() {
            warn!("Gateway health check is already running");
            return;
        }

        let gateway = self.clone();
        let period = self.config.health_check_interval();

        *handle = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // 第一次 tick 立即返回
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if let Err(e) = gateway.discover_devices().await {
                    debug!(error = %e, "Health check probe failed");
                }
                if !gateway.queue.is_empty().await && gateway.is_available().await {
                    gateway.replay_queued_commands().await;
                }
            }
        }));

        info!(interval = ?period, "Gateway health check started");
    }

    pub async fn stop_health_check(&self) {
        if let Some(handle) = self.health_check.lock().await.take() {
            handle.abort();
            info!("Gateway health check stopped");
        }
    }

    /// 关闭网关：停止后台任务并清空缓存与队列（可重复调用）
    pub async fn shutdown(&self) {
        self.stop_health_check().await;
        let discarded = self.queue.clear().await;
        self.cache.clear().await;
        if discarded > 0 {
            warn!(discarded = discarded, "Gateway shut down with queued commands");
        }
        info!("Device gateway shut down");
    }

    // ========== 内部 ==========

    async fn enqueue(&self, device_id: &str, command: &DeviceCommand) {
        self.queue
            .enqueue(QueuedCommand::new(device_id, command.clone()))
            .await;
        let queue_size = self.queue.len().await;
        info!(
            device_id = %device_id,
            action = command.action.as_str(),
            queue_size = queue_size,
            "Command queued during outage"
        );
    }

    async fn replay_if_pending(&self) {
        if !self.queue.is_empty().await {
            self.replay_queued_commands().await;
        }
    }

    async fn apply_to_cache(&self, device_id: &str, command: &DeviceCommand) {
        if let Some(power_state) = command.action.resulting_power_state() {
            self.cache.update_power_state(device_id, power_state).await;
        }
    }

    async fn record_success(&self) {
        let mut status = self.api_status.write().await;
        if !status.is_available {
            info!(
                failures = status.consecutive_failures,
                "Device cloud API available again"
            );
        }
        status.is_available = true;
        status.consecutive_failures = 0;
        status.last_checked = Some(Utc::now());
    }

    async fn record_failure(&self, error: &anyhow::Error) {
        let mut status = self.api_status.write().await;
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.last_checked = Some(Utc::now());

        if status.is_available && status.consecutive_failures >= self.config.failure_threshold {
            status.is_available = false;
            warn!(
                failures = status.consecutive_failures,
                error = %error,
                "Device cloud API marked unavailable"
            );
        } else {
            debug!(
                failures = status.consecutive_failures,
                error = %error,
                "Device cloud call failed"
            );
        }
    }
}

fn validate_device_id(device_id: &str) -> Result<()> {
    if device_id.trim().is_empty() {
        return Err(GatewayError::validation("device id must not be empty"));
    }
    Ok(())
}

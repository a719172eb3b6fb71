use crate::error::{AnomalyError, Result};
use crate::severity::{classify, AnomalySeverity};
use chrono::Duration as ChronoDuration;
use homeflux_config::AnomalyConfig;
use homeflux_gateway::DeviceGateway;
use homeflux_types::{AnomalyEvent, Device, DeviceCommand};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// 异常通知回调，参数为设备 ID 与事件
pub type NotificationCallback = Arc<dyn Fn(&str, &AnomalyEvent) + Send + Sync>;

/// 一次读数检查的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyCheck {
    pub is_anomaly: bool,
    pub severity: AnomalySeverity,
    pub reason: Option<String>,
    pub recommended_action: Option<String>,
}

impl AnomalyCheck {
    fn normal() -> Self {
        Self {
            is_anomaly: false,
            severity: AnomalySeverity::Normal,
            reason: None,
            recommended_action: None,
        }
    }
}

/// 功率异常检测器
///
/// 读数超过 `normal_power_range.max × multiplier` 时：记录事件、通过网关
/// 关断设备、通知回调，并在短时间内多次异常后禁用该设备的自动控制。
pub struct AnomalyDetector {
    gateway: Arc<DeviceGateway>,
    config: AnomalyConfig,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    history: Arc<RwLock<HashMap<String, Vec<AnomalyEvent>>>>,
    disabled: Arc<RwLock<HashSet<String>>>,
    callback: Arc<RwLock<Option<NotificationCallback>>>,
}

impl AnomalyDetector {
    pub fn new(gateway: Arc<DeviceGateway>, config: AnomalyConfig) -> Self {
        Self {
            gateway,
            config,
            devices: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
            disabled: Arc::new(RwLock::new(HashSet::new())),
            callback: Arc::new(RwLock::new(None)),
        }
    }

    /// 注册设备
    ///
    /// 正常功率范围只在首次注册时确定，重复注册保留原范围。
    pub async fn register_device(&self, device: Device) -> Result<()> {
        if device.id.trim().is_empty() {
            return Err(AnomalyError::validation("device id must not be empty"));
        }
        let range = device.normal_power_range;
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return Err(AnomalyError::validation(format!(
                "invalid normal power range for {}: {}..{}",
                device.id, range.min, range.max
            )));
        }

        let mut devices = self.devices.write().await;
        if let Some(existing) = devices.get(&device.id) {
            warn!(
                device_id = %device.id,
                min = existing.normal_power_range.min,
                max = existing.normal_power_range.max,
                "Device already registered, keeping original power range"
            );
            return Ok(());
        }

        info!(
            device_id = %device.id,
            min = range.min,
            max = range.max,
            "Device registered for anomaly detection"
        );
        devices.insert(device.id.clone(), device);
        Ok(())
    }

    /// 检查功率读数
    pub async fn check_for_anomalies(&self, device_id: &str, current_watts: f64) -> Result<AnomalyCheck> {
        if device_id.trim().is_empty() {
            return Err(AnomalyError::validation("device id must not be empty"));
        }
        if current_watts.is_nan() || current_watts < 0.0 {
            return Err(AnomalyError::validation(format!(
                "invalid power reading for {}: {}",
                device_id, current_watts
            )));
        }

        let range = self
            .devices
            .read()
            .await
            .get(device_id)
            .map(|d| d.normal_power_range)
            .ok_or_else(|| AnomalyError::NotRegistered(device_id.to_string()))?;

        let threshold = range.max * self.config.multiplier;
        let severity = classify(&range, current_watts, self.config.multiplier);

        match severity {
            AnomalySeverity::Normal => Ok(AnomalyCheck::normal()),
            AnomalySeverity::Elevated => {
                debug!(
                    device_id = %device_id,
                    watts = current_watts,
                    max = range.max,
                    "Power draw above normal range"
                );
                Ok(AnomalyCheck {
                    is_anomaly: false,
                    severity,
                    reason: Some(format!(
                        "{:.1}W exceeds normal maximum {:.1}W",
                        current_watts, range.max
                    )),
                    recommended_action: None,
                })
            }
            AnomalySeverity::Critical => {
                warn!(
                    device_id = %device_id,
                    watts = current_watts,
                    threshold = threshold,
                    "Anomaly detected"
                );

                let event = AnomalyEvent::shutdown(device_id, range, current_watts);
                self.append_event(event.clone()).await;

                if let Err(e) = self
                    .gateway
                    .send_command(device_id, &DeviceCommand::turn_off())
                    .await
                {
                    error!(device_id = %device_id, error = %e, "Emergency shutdown failed");
                }

                self.notify(device_id, &event).await;

                if self.should_disable_device(device_id).await {
                    self.disabled.write().await.insert(device_id.to_string());
                    warn!(
                        device_id = %device_id,
                        count = self.config.disable_count,
                        window = ?self.config.disable_window(),
                        "Automatic control disabled after repeated anomalies"
                    );
                }

                Ok(AnomalyCheck {
                    is_anomaly: true,
                    severity,
                    reason: Some(format!(
                        "{:.1}W exceeds {:.1}W ({}x normal maximum {:.1}W)",
                        current_watts, threshold, self.config.multiplier, range.max
                    )),
                    recommended_action: Some(AnomalyEvent::ACTION_SHUTDOWN.to_string()),
                })
            }
        }
    }

    /// 追加异常事件到设备历史
    ///
    /// 只接受已注册设备的事件，读数必须是非负数。
    pub async fn record_anomaly(&self, event: AnomalyEvent) -> Result<()> {
        if event.device_id.trim().is_empty() {
            return Err(AnomalyError::validation("device id must not be empty"));
        }
        if event.actual_value.is_nan() || event.actual_value < 0.0 {
            return Err(AnomalyError::validation(format!(
                "invalid power reading for {}: {}",
                event.device_id, event.actual_value
            )));
        }
        if !self.is_registered(&event.device_id).await {
            return Err(AnomalyError::NotRegistered(event.device_id));
        }
        self.append_event(event).await;
        Ok(())
    }

    /// 设备异常历史，按记录顺序
    pub async fn get_anomaly_history(&self, device_id: &str) -> Vec<AnomalyEvent> {
        self.history
            .read()
            .await
            .get(device_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 最近 `disable_count` 个事件是否落在 `disable_window` 之内
    pub async fn should_disable_device(&self, device_id: &str) -> bool {
        let count = self.config.disable_count;
        if count == 0 {
            return false;
        }

        let history = self.history.read().await;
        let Some(events) = history.get(device_id) else {
            return false;
        };
        if events.len() < count {
            return false;
        }

        let recent = &events[events.len() - count..];
        let (Some(oldest), Some(newest)) = (
            recent.iter().map(|e| e.timestamp).min(),
            recent.iter().map(|e| e.timestamp).max(),
        ) else {
            return false;
        };

        // 超出 chrono 表示范围的窗口视为无限大
        ChronoDuration::from_std(self.config.disable_window())
            .map(|window| newest - oldest <= window)
            .unwrap_or(true)
    }

    /// 设置通知回调（替换已有回调）
    pub async fn set_notification_callback<F>(&self, callback: F)
    where
        F: Fn(&str, &AnomalyEvent) + Send + Sync + 'static,
    {
        *self.callback.write().await = Some(Arc::new(callback));
    }

    pub async fn is_device_disabled(&self, device_id: &str) -> bool {
        self.disabled.read().await.contains(device_id)
    }

    /// 手动恢复设备的自动控制（不清除历史）
    pub async fn enable_device(&self, device_id: &str) -> bool {
        let removed = self.disabled.write().await.remove(device_id);
        if removed {
            info!(device_id = %device_id, "Automatic control re-enabled");
        }
        removed
    }

    pub async fn is_registered(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }

    /// 关闭检测器：清除注册、禁用集合与回调，历史保留（可重复调用）
    pub async fn shutdown(&self) {
        self.devices.write().await.clear();
        self.disabled.write().await.clear();
        *self.callback.write().await = None;
        info!("Anomaly detector shut down");
    }

    async fn append_event(&self, event: AnomalyEvent) {
        let mut history = self.history.write().await;
        let events = history.entry(event.device_id.clone()).or_default();
        events.push(event);
        debug!(count = events.len(), "Anomaly event recorded");
    }

    async fn notify(&self, device_id: &str, event: &AnomalyEvent) {
        let callback = self.callback.read().await.clone();
        match callback {
            Some(callback) => callback(device_id, event),
            None => debug!(device_id = %device_id, "No notification callback registered"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, Utc};
    use homeflux_config::GatewayConfig;
    use homeflux_gateway::SimulatedCloudClient;
    use homeflux_types::{DeviceType, PowerRange};

    fn detector() -> AnomalyDetector {
        let gateway = Arc::new(DeviceGateway::new(
            Arc::new(SimulatedCloudClient::new()),
            GatewayConfig::default(),
        ));
        AnomalyDetector::new(gateway, AnomalyConfig::default())
    }

    /// 已注册 heater（0..100W）的检测器
    async fn heater_detector() -> AnomalyDetector {
        let detector = detector();
        let heater = Device::new("heater", DeviceType::Thermostat, PowerRange::new(0.0, 100.0));
        detector.register_device(heater).await.unwrap();
        detector
    }

    fn event_at(device_id: &str, hours_ago: i64) -> AnomalyEvent {
        event_before(Utc::now(), device_id, hours_ago)
    }

    fn event_before(base: DateTime<Utc>, device_id: &str, hours_ago: i64) -> AnomalyEvent {
        AnomalyEvent::shutdown(device_id, PowerRange::new(0.0, 100.0), 200.0)
            .at(base - Duration::hours(hours_ago))
    }

    #[tokio::test]
    async fn test_should_disable_requires_full_window() {
        let detector = heater_detector().await;
        assert!(!detector.should_disable_device("heater").await);

        detector.record_anomaly(event_at("heater", 10)).await.unwrap();
        detector.record_anomaly(event_at("heater", 5)).await.unwrap();
        assert!(!detector.should_disable_device("heater").await);

        detector.record_anomaly(event_at("heater", 0)).await.unwrap();
        assert!(detector.should_disable_device("heater").await);
    }

    #[tokio::test]
    async fn test_should_disable_spread_over_window() {
        let detector = heater_detector().await;
        detector.record_anomaly(event_at("heater", 30)).await.unwrap();
        detector.record_anomaly(event_at("heater", 12)).await.unwrap();
        detector.record_anomaly(event_at("heater", 0)).await.unwrap();
        assert!(!detector.should_disable_device("heater").await);

        // 只看最近 3 个事件
        detector.record_anomaly(event_at("heater", 0)).await.unwrap();
        assert!(detector.should_disable_device("heater").await);
        assert_eq!(detector.get_anomaly_history("heater").await.len(), 4);
    }

    #[tokio::test]
    async fn test_should_disable_accepts_exact_window_span() {
        let detector = heater_detector().await;
        let base = Utc::now();
        detector.record_anomaly(event_before(base, "heater", 24)).await.unwrap();
        detector.record_anomaly(event_before(base, "heater", 12)).await.unwrap();
        detector.record_anomaly(event_before(base, "heater", 0)).await.unwrap();
        assert!(detector.should_disable_device("heater").await);
    }

    #[tokio::test]
    async fn test_record_anomaly_rejects_invalid_events() {
        let detector = heater_detector().await;

        assert!(matches!(
            detector.record_anomaly(event_at("ghost", 0)).await,
            Err(AnomalyError::NotRegistered(_))
        ));

        let mut negative = event_at("heater", 0);
        negative.actual_value = -5.0;
        assert!(matches!(
            detector.record_anomaly(negative).await,
            Err(AnomalyError::ValidationError(_))
        ));

        let mut nan = event_at("heater", 0);
        nan.actual_value = f64::NAN;
        assert!(matches!(
            detector.record_anomaly(nan).await,
            Err(AnomalyError::ValidationError(_))
        ));

        assert!(detector.get_anomaly_history("ghost").await.is_empty());
        assert!(detector.get_anomaly_history("heater").await.is_empty());
        assert!(!detector.should_disable_device("heater").await);
    }

    #[tokio::test]
    async fn test_register_keeps_original_range() {
        let detector = detector();
        let first = Device::new("plug_01", DeviceType::Plug, PowerRange::new(0.0, 100.0));
        let second = Device::new("plug_01", DeviceType::Plug, PowerRange::new(0.0, 1000.0));
        detector.register_device(first).await.unwrap();
        detector.register_device(second).await.unwrap();

        let check = detector.check_for_anomalies("plug_01", 160.0).await.unwrap();
        assert!(check.is_anomaly);
    }

    #[tokio::test]
    async fn test_register_rejects_bad_range() {
        let detector = detector();
        let device = Device::new("plug_01", DeviceType::Plug, PowerRange::new(50.0, 10.0));
        assert!(matches!(
            detector.register_device(device).await,
            Err(AnomalyError::ValidationError(_))
        ));
        assert!(!detector.is_registered("plug_01").await);
    }
}

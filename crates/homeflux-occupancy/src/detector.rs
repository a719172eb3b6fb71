use crate::analyzer::{BrightnessAnalyzer, FrameAnalyzer};
use crate::error::{OccupancyError, Result};
use homeflux_config::OccupancyConfig;
use homeflux_gateway::DeviceGateway;
use homeflux_types::{DeviceCommand, OccupancyResult, PowerState};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 单个位置的状态
#[derive(Default)]
struct LocationEntry {
    devices: Vec<String>,
    last_result: Option<OccupancyResult>,
    timer: Option<JoinHandle<()>>,
    /// 每次布防或取消定时器时递增，过期的定时器据此放弃执行
    generation: u64,
    /// 关断前的设备电源状态；存在即表示该位置已被关断
    snapshot: Option<BTreeMap<String, PowerState>>,
}

impl LocationEntry {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

type Locations = Arc<RwLock<HashMap<String, LocationEntry>>>;

/// 占用检测器
///
/// 位置持续无人达到阈值后记录设备状态并关断开着的设备；
/// 再次检测到有人时按记录恢复。
pub struct OccupancyDetector {
    gateway: Arc<DeviceGateway>,
    analyzer: Arc<dyn FrameAnalyzer>,
    threshold: Duration,
    locations: Locations,
    /// 串行化关断与恢复
    transition: Arc<Mutex<()>>,
}

impl OccupancyDetector {
    pub fn new(gateway: Arc<DeviceGateway>, config: OccupancyConfig) -> Self {
        let analyzer = Arc::new(BrightnessAnalyzer::from_config(&config));
        Self::with_analyzer(gateway, config, analyzer)
    }

    pub fn with_analyzer(
        gateway: Arc<DeviceGateway>,
        config: OccupancyConfig,
        analyzer: Arc<dyn FrameAnalyzer>,
    ) -> Self {
        Self {
            gateway,
            analyzer,
            threshold: config.unoccupied_threshold(),
            locations: Arc::new(RwLock::new(HashMap::new())),
            transition: Arc::new(Mutex::new(())),
        }
    }

    /// 注册位置下的设备（替换已有列表）
    pub async fn register_devices_for_location(
        &self,
        location: &str,
        device_ids: Vec<String>,
    ) -> Result<()> {
        validate_location(location)?;
        if device_ids.iter().any(|id| id.trim().is_empty()) {
            return Err(OccupancyError::validation(format!(
                "empty device id registered for location {}",
                location
            )));
        }

        info!(location = %location, devices = device_ids.len(), "Location devices registered");
        self.locations
            .write()
            .await
            .entry(location.to_string())
            .or_default()
            .devices = device_ids;
        Ok(())
    }

    /// 检测位置占用
    ///
    /// 分析失败或结果不可信时返回低置信度结果，不改变位置状态。
    pub async fn detect_occupancy(&self, frame: &[u8], location: &str) -> Result<OccupancyResult> {
        validate_location(location)?;

        let result = match self.analyzer.analyze(frame) {
            Ok(analysis) => OccupancyResult::new(
                location,
                analysis.occupied,
                analysis.confidence,
                analysis.person_count,
            ),
            Err(e) => {
                warn!(location = %location, error = %e, "Frame analysis failed");
                return Ok(OccupancyResult::unknown(location));
            }
        };

        if !result.is_trusted() {
            debug!(
                location = %location,
                confidence = result.confidence,
                frame_bytes = frame.len(),
                "Inconclusive frame ignored"
            );
            return Ok(result);
        }

        if result.occupied {
            self.handle_occupied(location, &result).await;
        } else {
            self.handle_unoccupied(location, &result).await;
        }

        Ok(result)
    }

    /// 最近一次可信的检测结果
    pub async fn get_location_state(&self, location: &str) -> Option<OccupancyResult> {
        self.locations
            .read()
            .await
            .get(location)
            .and_then(|entry| entry.last_result.clone())
    }

    pub async fn is_location_shut_down(&self, location: &str) -> bool {
        self.locations
            .read()
            .await
            .get(location)
            .map(|entry| entry.snapshot.is_some())
            .unwrap_or(false)
    }

    pub async fn has_pending_shutdown(&self, location: &str) -> bool {
        self.locations
            .read()
            .await
            .get(location)
            .and_then(|entry| entry.timer.as_ref())
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    /// 取消所有定时器并清空状态（可重复调用）
    pub async fn cleanup(&self) {
        let _guard = self.transition.lock().await;
        let mut locations = self.locations.write().await;
        for entry in locations.values_mut() {
            entry.cancel_timer();
        }
        let count = locations.len();
        locations.clear();
        info!(locations = count, "Occupancy detector cleaned up");
    }

    async fn handle_occupied(&self, location: &str, result: &OccupancyResult) {
        let _guard = self.transition.lock().await;

        let snapshot = {
            let mut locations = self.locations.write().await;
            let entry = locations.entry(location.to_string()).or_default();
            entry.cancel_timer();
            entry.last_result = Some(result.clone());
            entry.snapshot.take()
        };

        let Some(snapshot) = snapshot else {
            return;
        };

        let restore: Vec<&String> = snapshot
            .iter()
            .filter(|(_, state)| **state == PowerState::On)
            .map(|(id, _)| id)
            .collect();

        info!(location = %location, devices = restore.len(), "Occupancy detected, restoring devices");
        for device_id in restore {
            if let Err(e) = self
                .gateway
                .send_command(device_id, &DeviceCommand::turn_on())
                .await
            {
                error!(device_id = %device_id, location = %location, error = %e, "Device restore failed");
            }
        }
    }

    async fn handle_unoccupied(&self, location: &str, result: &OccupancyResult) {
        let _guard = self.transition.lock().await;
        let mut locations = self.locations.write().await;
        let entry = locations.entry(location.to_string()).or_default();
        entry.last_result = Some(result.clone());

        if entry.snapshot.is_some() {
            debug!(location = %location, "Location already shut down");
            return;
        }
        if entry.devices.is_empty() {
            debug!(location = %location, "No devices registered for location");
            return;
        }

        entry.cancel_timer();
        let generation = entry.generation;
        entry.timer = Some(tokio::spawn(shutdown_after(
            self.gateway.clone(),
            self.locations.clone(),
            self.transition.clone(),
            location.to_string(),
            generation,
            self.threshold,
        )));

        debug!(location = %location, threshold = ?self.threshold, "Unoccupied timer armed");
    }
}

/// 无人定时器：到期后记录设备状态并关断开着的设备
async fn shutdown_after(
    gateway: Arc<DeviceGateway>,
    locations: Locations,
    transition: Arc<Mutex<()>>,
    location: String,
    generation: u64,
    threshold: Duration,
) {
    tokio::time::sleep(threshold).await;
    let _guard = transition.lock().await;

    let devices = {
        let locations = locations.read().await;
        match locations.get(&location) {
            Some(entry) if entry.generation == generation && entry.snapshot.is_none() => {
                entry.devices.clone()
            }
            _ => return,
        }
    };

    info!(location = %location, devices = devices.len(), "Location unoccupied, shutting devices down");

    let mut snapshot = BTreeMap::new();
    for device_id in devices {
        let status = match gateway.get_device_status(&device_id).await {
            Ok(status) => status,
            Err(e) => {
                warn!(device_id = %device_id, location = %location, error = %e, "Device state unknown, left untouched");
                continue;
            }
        };

        snapshot.insert(device_id.clone(), status.power_state);
        if status.power_state != PowerState::On {
            continue;
        }

        if let Err(e) = gateway
            .send_command(&device_id, &DeviceCommand::turn_off())
            .await
        {
            error!(device_id = %device_id, location = %location, error = %e, "Device shutdown failed");
        }
    }

    let mut locations = locations.write().await;
    if let Some(entry) = locations.get_mut(&location) {
        entry.snapshot = Some(snapshot);
        entry.timer = None;
    }
}

fn validate_location(location: &str) -> Result<()> {
    if location.trim().is_empty() {
        return Err(OccupancyError::validation("location must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::{FrameAnalysis, MockFrameAnalyzer};
    use anyhow::anyhow;
    use homeflux_config::GatewayConfig;
    use homeflux_gateway::SimulatedCloudClient;

    fn detector_with(analyzer: MockFrameAnalyzer) -> (SimulatedCloudClient, OccupancyDetector) {
        let client = SimulatedCloudClient::new();
        let gateway = Arc::new(DeviceGateway::new(
            Arc::new(client.clone()),
            GatewayConfig::default(),
        ));
        let detector =
            OccupancyDetector::with_analyzer(gateway, OccupancyConfig::default(), Arc::new(analyzer));
        (client, detector)
    }

    #[tokio::test]
    async fn test_analyzer_error_degrades_to_unknown() {
        let mut analyzer = MockFrameAnalyzer::new();
        analyzer
            .expect_analyze()
            .returning(|_| Err(anyhow!("model crashed")));
        let (_client, detector) = detector_with(analyzer);

        let result = detector.detect_occupancy(&[1, 2, 3], "kitchen").await.unwrap();
        assert!(!result.occupied);
        assert!(!result.is_trusted());
        assert!(detector.get_location_state("kitchen").await.is_none());
    }

    #[tokio::test]
    async fn test_trusted_result_is_remembered() {
        let mut analyzer = MockFrameAnalyzer::new();
        analyzer.expect_analyze().returning(|_| {
            Ok(FrameAnalysis {
                occupied: true,
                confidence: 0.9,
                person_count: 2,
            })
        });
        let (_client, detector) = detector_with(analyzer);

        detector.detect_occupancy(&[0; 4], "den").await.unwrap();
        let state = detector.get_location_state("den").await.unwrap();
        assert!(state.occupied);
        assert_eq!(state.person_count, 2);
    }

    #[tokio::test]
    async fn test_empty_location_rejected() {
        let (_client, detector) = detector_with(MockFrameAnalyzer::new());
        assert!(detector.detect_occupancy(&[0; 4], " ").await.is_err());
        assert!(detector
            .register_devices_for_location("", vec!["a".to_string()])
            .await
            .is_err());
        assert!(detector
            .register_devices_for_location("kitchen", vec!["".to_string()])
            .await
            .is_err());
    }
}

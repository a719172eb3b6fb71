use chrono::Utc;
use homeflux_types::{Device, DeviceStatus, PowerState};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    cached_at: Instant,
}

impl<T> CacheEntry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            cached_at: Instant::now(),
        }
    }

    fn is_fresh(&self, ttl: Duration) -> bool {
        self.cached_at.elapsed() < ttl
    }
}

/// 设备元数据与状态缓存（带有效期）
#[derive(Clone)]
pub struct DeviceCache {
    ttl: Duration,
    devices: Arc<RwLock<HashMap<String, CacheEntry<Device>>>>,
    statuses: Arc<RwLock<HashMap<String, CacheEntry<DeviceStatus>>>>,
}

impl DeviceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            devices: Arc::new(RwLock::new(HashMap::new())),
            statuses: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn put_device(&self, device: Device) {
        self.devices
            .write()
            .await
            .insert(device.id.clone(), CacheEntry::new(device));
    }

    /// 获取未过期的设备
    pub async fn get_device(&self, device_id: &str) -> Option<Device> {
        self.devices
            .read()
            .await
            .get(device_id)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone())
    }

    /// 所有未过期的设备
    pub async fn fresh_devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self
            .devices
            .read()
            .await
            .values()
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone())
            .collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        devices
    }

    /// 将不在 `seen` 中的缓存设备标记为离线
    pub async fn mark_missing_offline(&self, seen: &[String]) -> usize {
        let mut devices = self.devices.write().await;
        let mut marked = 0;
        for (id, entry) in devices.iter_mut() {
            if entry.value.online && !seen.contains(id) {
                entry.value.mark_offline();
                marked += 1;
                debug!(device_id = %id, "Device missing from discovery, marked offline");
            }
        }
        marked
    }

    pub async fn put_status(&self, status: DeviceStatus) {
        self.statuses
            .write()
            .await
            .insert(status.device_id.clone(), CacheEntry::new(status));
    }

    pub async fn get_status(&self, device_id: &str) -> Option<DeviceStatus> {
        self.statuses
            .read()
            .await
            .get(device_id)
            .filter(|entry| entry.is_fresh(self.ttl))
            .map(|entry| entry.value.clone())
    }

    /// 指令成功后更新缓存中的电源状态
    pub async fn update_power_state(&self, device_id: &str, power_state: PowerState) {
        let mut statuses = self.statuses.write().await;
        let status = match statuses.remove(device_id) {
            Some(entry) => {
                let mut status = entry.value;
                status.power_state = power_state;
                status.last_updated = Utc::now();
                status
            }
            None => DeviceStatus::new(device_id, power_state),
        };
        statuses.insert(device_id.to_string(), CacheEntry::new(status));
    }

    pub async fn clear(&self) {
        self.devices.write().await.clear();
        self.statuses.write().await.clear();
    }
}

use crate::clock::Clock;
use crate::error::{Result, ScheduleError};
use crate::recurrence::next_occurrence;
use chrono::{NaiveDateTime, NaiveTime};
use homeflux_gateway::DeviceGateway;
use homeflux_types::{AdaptiveSchedule, DeviceCommand, ScheduleOverride, ScheduledAction};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// 覆盖回调
pub type OverrideCallback = Arc<dyn Fn(&ScheduleOverride) + Send + Sync>;

/// 设备调度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleState {
    None,
    Active,
    Paused,
}

struct ScheduleEntry {
    schedule: AdaptiveSchedule,
    paused: bool,
    timers: Vec<JoinHandle<()>>,
}

impl ScheduleEntry {
    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

/// 调度执行器
///
/// 每个定时动作对应一条一次性定时器链：触发后立即计算并挂起下一次。
pub struct ScheduleExecutor {
    gateway: Arc<DeviceGateway>,
    clock: Arc<dyn Clock>,
    entries: Arc<RwLock<HashMap<String, ScheduleEntry>>>,
    callbacks: Arc<RwLock<HashMap<String, OverrideCallback>>>,
}

impl ScheduleExecutor {
    pub fn new(gateway: Arc<DeviceGateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            gateway,
            clock,
            entries: Arc::new(RwLock::new(HashMap::new())),
            callbacks: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 执行调度
    ///
    /// 取代设备已有的调度并取消其定时器；设备处于暂停状态时只保存调度。
    pub async fn execute_schedule(&self, schedule: AdaptiveSchedule) -> Result<()> {
        let parsed = validate_schedule(&schedule)?;
        let device_id = schedule.device_id.clone();

        let mut entries = self.entries.write().await;
        let paused = match entries.get_mut(&device_id) {
            Some(existing) => {
                existing.cancel_timers();
                existing.paused
            }
            None => false,
        };

        let timers = if paused {
            Vec::new()
        } else {
            self.arm_timers(&device_id, &schedule.actions, &parsed)
        };

        info!(
            device_id = %device_id,
            actions = schedule.actions.len(),
            confidence = schedule.confidence,
            paused = paused,
            "Schedule executed"
        );

        entries.insert(
            device_id,
            ScheduleEntry {
                schedule,
                paused,
                timers,
            },
        );
        Ok(())
    }

    /// 暂停调度：取消所有定时器，保留调度内容
    pub async fn pause_schedule(&self, device_id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(device_id)
            .ok_or_else(|| ScheduleError::NotFound(device_id.to_string()))?;

        entry.cancel_timers();
        entry.paused = true;

        info!(device_id = %device_id, "Schedule paused");
        Ok(())
    }

    /// 恢复调度：按保存的调度重新挂起定时器
    pub async fn resume_schedule(&self, device_id: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(device_id)
            .ok_or_else(|| ScheduleError::NotFound(device_id.to_string()))?;

        if !entry.paused {
            debug!(device_id = %device_id, "Schedule is not paused");
            return Ok(());
        }

        let parsed = validate_schedule(&entry.schedule)?;
        entry.cancel_timers();
        entry.timers = self.arm_timers(device_id, &entry.schedule.actions, &parsed);
        entry.paused = false;

        info!(device_id = %device_id, "Schedule resumed");
        Ok(())
    }

    /// 处理手动覆盖
    ///
    /// 立即下发覆盖指令并调用已注册的回调。不会取消已挂起的调度定时器。
    pub async fn handle_override(&self, device_id: &str, record: ScheduleOverride) -> Result<()> {
        if device_id.trim().is_empty() {
            return Err(ScheduleError::validation("device id must not be empty"));
        }

        info!(
            device_id = %device_id,
            action = record.command.action.as_str(),
            reason = ?record.reason,
            "Applying schedule override"
        );

        dispatch(
            self.gateway.clone(),
            device_id.to_string(),
            record.command.clone(),
            "override",
        )
        .await;

        let callback = self.callbacks.read().await.get(device_id).cloned();
        if let Some(callback) = callback {
            callback(&record);
        }

        Ok(())
    }

    /// 注册设备覆盖回调（替换已有回调）
    pub async fn on_override<F>(&self, device_id: &str, callback: F)
    where
        F: Fn(&ScheduleOverride) + Send + Sync + 'static,
    {
        self.callbacks
            .write()
            .await
            .insert(device_id.to_string(), Arc::new(callback));
    }

    /// 获取设备的调度（暂停中的调度同样返回）
    pub async fn get_active_schedule(&self, device_id: &str) -> Option<AdaptiveSchedule> {
        self.entries
            .read()
            .await
            .get(device_id)
            .map(|entry| entry.schedule.clone())
    }

    pub async fn is_schedule_paused(&self, device_id: &str) -> bool {
        self.entries
            .read()
            .await
            .get(device_id)
            .map(|entry| entry.paused)
            .unwrap_or(false)
    }

    pub async fn get_schedule_state(&self, device_id: &str) -> ScheduleState {
        match self.entries.read().await.get(device_id) {
            None => ScheduleState::None,
            Some(entry) if entry.paused => ScheduleState::Paused,
            Some(_) => ScheduleState::Active,
        }
    }

    /// 设备当前挂起的定时器数量
    pub async fn armed_timer_count(&self, device_id: &str) -> usize {
        self.entries
            .read()
            .await
            .get(device_id)
            .map(|entry| entry.timers.iter().filter(|t| !t.is_finished()).count())
            .unwrap_or(0)
    }

    /// 关闭执行器：取消所有定时器并清空状态（可重复调用）
    pub async fn shutdown(&self) {
        let mut entries = self.entries.write().await;
        for entry in entries.values_mut() {
            entry.cancel_timers();
        }
        let count = entries.len();
        entries.clear();
        drop(entries);

        self.callbacks.write().await.clear();
        info!(schedules = count, "Schedule executor shut down");
    }

    fn arm_timers(
        &self,
        device_id: &str,
        actions: &[ScheduledAction],
        times: &[NaiveTime],
    ) -> Vec<JoinHandle<()>> {
        actions
            .iter()
            .zip(times.iter())
            .map(|(action, time)| {
                tokio::spawn(run_action_chain(
                    self.gateway.clone(),
                    self.clock.clone(),
                    device_id.to_string(),
                    action.clone(),
                    *time,
                ))
            })
            .collect()
    }
}

/// 单个定时动作的定时器链
async fn run_action_chain(
    gateway: Arc<DeviceGateway>,
    clock: Arc<dyn Clock>,
    device_id: String,
    action: ScheduledAction,
    time: NaiveTime,
) {
    let mut last_fired: Option<NaiveDateTime> = None;

    loop {
        let now = clock.now();
        // 墙钟可能略慢于定时器，避免同一时刻重复触发
        let reference = last_fired.map_or(now, |fired| fired.max(now));

        let Some(next) = next_occurrence(reference, time, &action.weekdays) else {
            warn!(device_id = %device_id, time = %action.time, "No future occurrence, timer chain stopped");
            return;
        };

        let delay = (next - now).to_std().unwrap_or(Duration::ZERO);
        debug!(
            device_id = %device_id,
            time = %action.time,
            next = %next,
            delay = ?delay,
            "Schedule timer armed"
        );

        tokio::time::sleep(delay).await;
        last_fired = Some(next);

        info!(
            device_id = %device_id,
            time = %action.time,
            action = action.command.action.as_str(),
            "Scheduled action fired"
        );
        // 取消定时器只中断等待，已触发的指令独立完成
        tokio::spawn(dispatch(
            gateway.clone(),
            device_id.clone(),
            action.command.clone(),
            "schedule",
        ));
    }
}

async fn dispatch(
    gateway: Arc<DeviceGateway>,
    device_id: String,
    command: DeviceCommand,
    source: &'static str,
) {
    if let Err(e) = gateway.send_command(&device_id, &command).await {
        error!(
            device_id = %device_id,
            action = command.action.as_str(),
            source = source,
            error = %e,
            "Command dispatch failed"
        );
    }
}

fn validate_schedule(schedule: &AdaptiveSchedule) -> Result<Vec<NaiveTime>> {
    if schedule.device_id.trim().is_empty() {
        return Err(ScheduleError::validation("device id must not be empty"));
    }

    schedule
        .actions
        .iter()
        .map(|action| {
            if action.weekdays.is_empty() {
                return Err(ScheduleError::validation(format!(
                    "action at {} has no weekdays",
                    action.time
                )));
            }
            if let Some(day) = action.weekdays.iter().find(|d| **d > 6) {
                return Err(ScheduleError::validation(format!(
                    "weekday {} out of range 0-6",
                    day
                )));
            }
            action.time_of_day().map_err(|e| {
                ScheduleError::validation(format!("invalid time '{}': {}", action.time, e))
            })
        })
        .collect()
}

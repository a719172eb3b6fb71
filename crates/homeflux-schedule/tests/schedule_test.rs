use chrono::{NaiveDate, NaiveDateTime};
use homeflux_config::GatewayConfig;
use homeflux_gateway::{DeviceGateway, SimulatedCloudClient, UpstreamCall};
use homeflux_schedule::{ScheduleError, ScheduleExecutor, ScheduleState, SimulatedClock};
use homeflux_types::{
    AdaptiveSchedule, CommandAction, DeviceCommand, OverrideReason, ScheduleOverride,
    ScheduledAction,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// 2026-10-18 是周日
fn sunday_morning() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2026, 10, 18)
        .unwrap()
        .and_hms_opt(7, 0, 0)
        .unwrap()
}

fn setup() -> (SimulatedCloudClient, Arc<DeviceGateway>, ScheduleExecutor) {
    let client = SimulatedCloudClient::new();
    let gateway = Arc::new(DeviceGateway::new(
        Arc::new(client.clone()),
        GatewayConfig::default(),
    ));
    let clock = Arc::new(SimulatedClock::starting_at(sunday_morning()));
    let executor = ScheduleExecutor::new(gateway.clone(), clock);
    (client, gateway, executor)
}

fn daily(device_id: &str, time: &str, command: DeviceCommand) -> AdaptiveSchedule {
    AdaptiveSchedule::new(device_id, vec![ScheduledAction::daily(time, command)])
}

async fn command_attempts(client: &SimulatedCloudClient) -> usize {
    client
        .calls()
        .await
        .iter()
        .filter(|c| matches!(c, UpstreamCall::Command { .. }))
        .count()
}

#[tokio::test(start_paused = true)]
async fn test_action_fires_then_rearms_daily() {
    let (client, _gateway, executor) = setup();
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();
    assert_eq!(executor.get_schedule_state("lamp").await, ScheduleState::Active);
    assert_eq!(executor.armed_timer_count("lamp").await, 1);

    sleep(29 * MINUTE).await;
    assert!(client.delivered_actions("lamp").await.is_empty());

    sleep(2 * MINUTE).await;
    assert_eq!(client.delivered_actions("lamp").await, vec![CommandAction::TurnOn]);

    sleep(24 * HOUR).await;
    assert_eq!(client.delivered_actions("lamp").await.len(), 2);
    assert_eq!(executor.armed_timer_count("lamp").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_weekday_set_is_respected() {
    let (client, _gateway, executor) = setup();
    // 仅周一 06:00
    let schedule = AdaptiveSchedule::new(
        "heater",
        vec![ScheduledAction::new("06:00", DeviceCommand::turn_off(), [1])],
    );
    executor.execute_schedule(schedule).await.unwrap();

    // 周一 05:00
    sleep(22 * HOUR).await;
    assert!(client.delivered_actions("heater").await.is_empty());

    // 周一 07:00
    sleep(2 * HOUR).await;
    assert_eq!(client.delivered_actions("heater").await.len(), 1);

    // 周日 07:00，下周一之前不再触发
    sleep(6 * 24 * HOUR).await;
    assert_eq!(client.delivered_actions("heater").await.len(), 1);

    sleep(24 * HOUR).await;
    assert_eq!(client.delivered_actions("heater").await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pause_suppresses_and_resume_rearms() {
    let (client, _gateway, executor) = setup();
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();

    executor.pause_schedule("lamp").await.unwrap();
    assert!(executor.is_schedule_paused("lamp").await);
    assert_eq!(executor.armed_timer_count("lamp").await, 0);
    assert!(executor.get_active_schedule("lamp").await.is_some());

    sleep(HOUR).await;
    assert!(client.delivered_actions("lamp").await.is_empty());

    // 08:00 恢复，下次触发为明天 07:30
    executor.resume_schedule("lamp").await.unwrap();
    assert_eq!(executor.get_schedule_state("lamp").await, ScheduleState::Active);

    // 明天 07:29
    sleep(23 * HOUR + 29 * MINUTE).await;
    assert!(client.delivered_actions("lamp").await.is_empty());

    sleep(2 * MINUTE).await;
    assert_eq!(client.delivered_actions("lamp").await, vec![CommandAction::TurnOn]);
}

/// 当前行为：覆盖不会取消已挂起的调度定时器，两者各自执行
#[tokio::test(start_paused = true)]
async fn test_override_does_not_cancel_pending_timer() {
    let (client, _gateway, executor) = setup();
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    executor
        .on_override("lamp", move |record| {
            sink.lock().unwrap().push(record.clone());
        })
        .await;

    let record = ScheduleOverride::new("lamp", DeviceCommand::turn_off(), OverrideReason::Manual);
    executor.handle_override("lamp", record).await.unwrap();

    assert_eq!(client.delivered_actions("lamp").await, vec![CommandAction::TurnOff]);
    {
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].reason, OverrideReason::Manual);
    }

    sleep(31 * MINUTE).await;
    assert_eq!(
        client.delivered_actions("lamp").await,
        vec![CommandAction::TurnOff, CommandAction::TurnOn]
    );
}

#[tokio::test(start_paused = true)]
async fn test_override_without_callback_still_dispatches() {
    let (client, _gateway, executor) = setup();
    let record = ScheduleOverride::new(
        "fan",
        DeviceCommand::set_value("speed", 2.0),
        OverrideReason::Occupancy,
    );
    executor.handle_override("fan", record).await.unwrap();
    assert_eq!(client.delivered_actions("fan").await, vec![CommandAction::SetValue]);

    let record = ScheduleOverride::new("", DeviceCommand::turn_off(), OverrideReason::Manual);
    assert!(matches!(
        executor.handle_override("", record).await,
        Err(ScheduleError::ValidationError(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_new_schedule_replaces_old_timers() {
    let (client, _gateway, executor) = setup();
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();
    executor
        .execute_schedule(daily("lamp", "08:00", DeviceCommand::turn_off()))
        .await
        .unwrap();

    sleep(2 * HOUR).await;
    assert_eq!(client.delivered_actions("lamp").await, vec![CommandAction::TurnOff]);

    let active = executor.get_active_schedule("lamp").await.unwrap();
    assert_eq!(active.actions[0].time, "08:00");
}

#[tokio::test(start_paused = true)]
async fn test_execute_while_paused_stores_without_arming() {
    let (client, _gateway, executor) = setup();
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();
    executor.pause_schedule("lamp").await.unwrap();

    executor
        .execute_schedule(daily("lamp", "07:45", DeviceCommand::turn_off()))
        .await
        .unwrap();
    assert!(executor.is_schedule_paused("lamp").await);
    assert_eq!(executor.armed_timer_count("lamp").await, 0);

    sleep(HOUR).await;
    assert!(client.delivered_actions("lamp").await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_failure_keeps_chain_running() {
    let (client, gateway, executor) = setup();
    client.set_failing(true);
    executor
        .execute_schedule(daily("pump", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();

    sleep(31 * MINUTE).await;
    assert_eq!(command_attempts(&client).await, 1);

    sleep(24 * HOUR).await;
    assert_eq!(command_attempts(&client).await, 2);
    assert_eq!(gateway.get_queue_status().await.size, 2);
    assert_eq!(executor.armed_timer_count("pump").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_cancels_everything() {
    let (client, _gateway, executor) = setup();
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();

    executor.shutdown().await;
    executor.shutdown().await;
    assert_eq!(executor.get_schedule_state("lamp").await, ScheduleState::None);

    sleep(HOUR).await;
    assert!(client.delivered_actions("lamp").await.is_empty());
}

#[tokio::test]
async fn test_pause_unknown_device() {
    let (_client, _gateway, executor) = setup();
    assert!(matches!(
        executor.pause_schedule("ghost").await,
        Err(ScheduleError::NotFound(_))
    ));
    assert!(matches!(
        executor.resume_schedule("ghost").await,
        Err(ScheduleError::NotFound(_))
    ));
    assert!(!executor.is_schedule_paused("ghost").await);
}

/// 触发后暂停调度，正在下发的指令仍然送达
#[tokio::test(start_paused = true)]
async fn test_pause_during_in_flight_command_still_delivers() {
    let (client, gateway, executor) = setup();
    client.set_latency(Duration::from_secs(5));
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();

    sleep(30 * MINUTE + Duration::from_secs(1)).await;
    assert_eq!(command_attempts(&client).await, 1);
    executor.pause_schedule("lamp").await.unwrap();

    sleep(Duration::from_secs(10)).await;
    assert_eq!(client.delivered_actions("lamp").await, vec![CommandAction::TurnOn]);
    assert_eq!(gateway.get_queue_status().await.size, 0);
}

/// 触发引起的队列回放不会因暂停而丢失其他设备的指令
#[tokio::test(start_paused = true)]
async fn test_pause_during_replay_keeps_other_devices_commands() {
    let (client, gateway, executor) = setup();
    client.set_failing(true);
    gateway.send_command("other", &DeviceCommand::turn_on()).await.unwrap();
    gateway.send_command("other2", &DeviceCommand::turn_on()).await.unwrap();
    assert_eq!(gateway.get_queue_status().await.size, 2);

    client.set_failing(false);
    client.set_latency(Duration::from_secs(5));
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_on()))
        .await
        .unwrap();

    // 07:30 触发：lamp 排到队尾，回放依次下发 other、other2、lamp
    sleep(30 * MINUTE + Duration::from_secs(7)).await;
    executor.pause_schedule("lamp").await.unwrap();

    sleep(Duration::from_secs(30)).await;
    let delivered: Vec<String> = client
        .delivered_commands()
        .await
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(delivered, vec!["other", "other2", "lamp"]);
    assert_eq!(gateway.get_queue_status().await.size, 0);
}

/// 关闭执行器不会取消已触发的指令
#[tokio::test(start_paused = true)]
async fn test_shutdown_during_in_flight_command_still_delivers() {
    let (client, _gateway, executor) = setup();
    client.set_latency(Duration::from_secs(5));
    executor
        .execute_schedule(daily("lamp", "07:30", DeviceCommand::turn_off()))
        .await
        .unwrap();

    sleep(30 * MINUTE + Duration::from_secs(2)).await;
    executor.shutdown().await;

    sleep(Duration::from_secs(10)).await;
    assert_eq!(client.delivered_actions("lamp").await, vec![CommandAction::TurnOff]);
}

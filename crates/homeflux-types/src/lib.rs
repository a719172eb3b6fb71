pub mod anomaly;
pub mod command;
pub mod device;
pub mod occupancy;
pub mod schedule;

pub use anomaly::AnomalyEvent;
pub use command::{ApiStatus, CommandAction, CommandParams, DeviceCommand, QueuedCommand};
pub use device::{Device, DeviceStatus, DeviceType, PowerRange, PowerState};
pub use occupancy::OccupancyResult;
pub use schedule::{AdaptiveSchedule, OverrideReason, ScheduleOverride, ScheduledAction};

use homeflux_anomaly::AnomalyError;
use homeflux_gateway::GatewayError;
use homeflux_occupancy::OccupancyError;
use homeflux_schedule::ScheduleError;
use thiserror::Error;

/// 控制器错误类型
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Anomaly error: {0}")]
    Anomaly(#[from] AnomalyError),

    #[error("Occupancy error: {0}")]
    Occupancy(#[from] OccupancyError),
}

pub type Result<T> = std::result::Result<T, CoreError>;

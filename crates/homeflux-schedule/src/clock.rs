use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use tokio::time::Instant;

/// 本地墙钟时间来源
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// 系统本地时间
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// 从固定时刻起、随 tokio 时钟推进的时钟
///
/// 配合 `tokio::time::pause` 使用时，墙钟时间与定时器保持一致。
#[derive(Debug, Clone)]
pub struct SimulatedClock {
    origin: NaiveDateTime,
    started: Instant,
}

impl SimulatedClock {
    pub fn starting_at(origin: NaiveDateTime) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Clock for SimulatedClock {
    fn now(&self) -> NaiveDateTime {
        let elapsed = ChronoDuration::from_std(self.started.elapsed()).unwrap_or_else(|_| ChronoDuration::zero());
        self.origin + elapsed
    }
}

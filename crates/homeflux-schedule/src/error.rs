use thiserror::Error;

/// 调度错误类型
#[derive(Error, Debug)]
pub enum ScheduleError {
    /// 调度未找到
    #[error("Schedule not found for device: {0}")]
    NotFound(String),

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// 调度结果类型
pub type Result<T> = std::result::Result<T, ScheduleError>;

impl ScheduleError {
    pub fn validation(msg: impl Into<String>) -> Self {
        ScheduleError::ValidationError(msg.into())
    }
}

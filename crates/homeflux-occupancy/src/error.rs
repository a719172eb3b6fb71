use thiserror::Error;

/// 占用检测错误类型
#[derive(Error, Debug)]
pub enum OccupancyError {
    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, OccupancyError>;

impl OccupancyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        OccupancyError::ValidationError(msg.into())
    }
}

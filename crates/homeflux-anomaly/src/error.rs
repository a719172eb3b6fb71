use thiserror::Error;

/// 异常检测错误类型
#[derive(Error, Debug)]
pub enum AnomalyError {
    /// 设备未注册
    #[error("Device not registered: {0}")]
    NotRegistered(String),

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, AnomalyError>;

impl AnomalyError {
    pub fn validation(msg: impl Into<String>) -> Self {
        AnomalyError::ValidationError(msg.into())
    }
}

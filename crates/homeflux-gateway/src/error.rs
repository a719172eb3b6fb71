use thiserror::Error;

/// 网关错误类型
#[derive(Error, Debug)]
pub enum GatewayError {
    /// 参数验证失败（不修改任何状态）
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 上游不可用且没有有效缓存
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

/// 网关结果类型
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::ValidationError(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        GatewayError::UpstreamUnavailable(msg.into())
    }
}

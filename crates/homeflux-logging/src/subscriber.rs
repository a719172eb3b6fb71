use homeflux_config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("Global subscriber already initialized")]
    AlreadyInitialized,
}

/// 构建过滤器
///
/// 优先使用 `RUST_LOG`，否则使用配置中的级别。
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
        directive: config.level.clone(),
        reason: e.to_string(),
    })
}

/// 初始化全局日志订阅者
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;

    let result = if config.json {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .try_init()
    };

    result.map_err(|_| LoggingError::AlreadyInitialized)?;

    tracing::info!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_filter_from_config() {
        let config = LoggingConfig {
            level: "homeflux_gateway=debug,warn".to_string(),
            json: false,
        };
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_second_init_is_rejected() {
        let config = LoggingConfig::default();
        let first = init_logging(&config);
        let second = init_logging(&config);

        // 第一次可能因其他测试已初始化而失败，但第二次一定失败
        assert!(first.is_ok() || matches!(first, Err(LoggingError::AlreadyInitialized)));
        assert!(matches!(second, Err(LoggingError::AlreadyInitialized)));
    }
}

use anyhow::{anyhow, Context, Result};
use config::{Config, File, FileFormat};
use std::path::{Path, PathBuf};

use crate::GlobalConfig;

/// 配置加载器
pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub const CONFIG_FILE: &'static str = "homeflux.toml";

    /// 创建配置加载器
    pub fn new<P: AsRef<Path>>(config_dir: P) -> Self {
        Self {
            config_dir: config_dir.as_ref().to_path_buf(),
        }
    }

    /// 加载全局配置
    pub fn load(&self) -> Result<GlobalConfig> {
        let config_path = self.config_dir.join(Self::CONFIG_FILE);

        if !config_path.exists() {
            // 配置文件不存在时使用默认配置
            return Ok(GlobalConfig::default());
        }

        let config = Config::builder()
            .add_source(File::new(
                config_path.to_str().ok_or_else(|| anyhow!("Invalid config path"))?,
                FileFormat::Toml,
            ))
            .build()
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        config
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", config_path.display()))
    }

    /// 加载并验证
    pub fn load_validated(&self) -> Result<GlobalConfig> {
        let config = self.load()?;
        Self::validate(&config)?;
        Ok(config)
    }

    /// 验证配置
    pub fn validate(config: &GlobalConfig) -> Result<()> {
        if config.gateway.queue_max_size == 0 {
            return Err(anyhow!("gateway.queue_max_size must be greater than 0"));
        }

        if config.gateway.failure_threshold == 0 {
            return Err(anyhow!("gateway.failure_threshold must be greater than 0"));
        }

        if config.anomaly.multiplier <= 1.0 {
            return Err(anyhow!(
                "anomaly.multiplier ({}) must be greater than 1.0",
                config.anomaly.multiplier
            ));
        }

        if config.anomaly.disable_count == 0 {
            return Err(anyhow!("anomaly.disable_count must be greater than 0"));
        }

        if config.occupancy.dark_threshold >= config.occupancy.presence_threshold {
            return Err(anyhow!(
                "occupancy.dark_threshold ({}) must be below presence_threshold ({})",
                config.occupancy.dark_threshold,
                config.occupancy.presence_threshold
            ));
        }

        Ok(())
    }
}

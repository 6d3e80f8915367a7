use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::sections::{
    DiscoverySettings, DistributorSettings, ExecutorSettings, HealthSettings, ObservabilityConfig,
    RegistrySettings,
};
use crate::logging::LogConfig;
use crate::models::PoolDescriptor;

/// 默认配置文件查找路径
const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/fleet.toml",
    "fleet.toml",
    "/etc/fleet/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub registry: RegistrySettings,
    pub executor: ExecutorSettings,
    pub distributor: DistributorSettings,
    pub health: HealthSettings,
    pub discovery: DiscoverySettings,
    pub observability: ObservabilityConfig,
    pub logging: LogConfig,
    /// 启动时静态注册的工作池
    pub pools: Vec<PoolDescriptor>,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: FLEET_, nested keys separated by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        match config_path {
            Some(path) => {
                if !Path::new(path).exists() {
                    return Err(anyhow::anyhow!("配置文件不存在: {}", path));
                }
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
            None => {
                if let Some(path) = DEFAULT_CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEET")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.registry.validate().context("注册表配置验证失败")?;
        self.executor.validate().context("执行器配置验证失败")?;
        self.distributor.validate().context("分发器配置验证失败")?;
        self.health.validate().context("健康监控配置验证失败")?;
        self.discovery.validate().context("发现配置验证失败")?;
        self.observability.validate().context("可观测性配置验证失败")?;
        self.logging.validate().context("日志配置验证失败")?;

        let mut seen = HashSet::new();
        for pool in &self.pools {
            pool.validate()
                .with_context(|| format!("静态工作池 {} 配置无效", pool.name))?;
            if !seen.insert(pool.name.as_str()) {
                return Err(anyhow::anyhow!("静态工作池名称重复: {}", pool.name));
            }
        }

        Ok(())
    }
}

use serde::{Deserialize, Serialize};

use crate::errors::{FleetError, FleetResult};

/// 注册表配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// 经发现加入的工作池连续缺席多少次发现轮次后被清除，`None` 表示从不清除
    pub purge_after_missed_sweeps: Option<u32>,
}

impl RegistrySettings {
    pub fn validate(&self) -> FleetResult<()> {
        if self.purge_after_missed_sweeps == Some(0) {
            return Err(FleetError::Configuration(
                "purge_after_missed_sweeps 必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSettings {
    /// 取消信号投递的超时时间（秒）
    pub cancel_timeout_seconds: u64,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            cancel_timeout_seconds: 5,
        }
    }
}

impl ExecutorSettings {
    pub fn validate(&self) -> FleetResult<()> {
        if self.cancel_timeout_seconds == 0 {
            return Err(FleetError::Configuration(
                "取消超时时间必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributorSettings {
    /// 扇出时的最大并发提交数
    pub max_parallel_tasks: usize,
}

impl Default for DistributorSettings {
    fn default() -> Self {
        Self {
            max_parallel_tasks: 10,
        }
    }
}

impl DistributorSettings {
    pub fn validate(&self) -> FleetResult<()> {
        if self.max_parallel_tasks == 0 {
            return Err(FleetError::Configuration(
                "max_parallel_tasks 必须大于0".to_string(),
            ));
        }
        Ok(())
    }
}

/// 健康监控配置（文件格式，时间单位为秒/毫秒）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub check_interval_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub failure_threshold: u32,
    pub cooldown_seconds: u64,
    /// 负载率超过该值视为 DEGRADED
    pub degraded_load_threshold: f64,
    /// 积压任务数超过该值视为 DEGRADED
    pub degraded_queue_threshold: u32,
    /// 探测响应时间超过该值视为 DEGRADED
    pub degraded_latency_ms: u64,
    pub history_capacity: usize,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: 30,
            probe_timeout_seconds: 5,
            failure_threshold: 3,
            cooldown_seconds: 60,
            degraded_load_threshold: 0.9,
            degraded_queue_threshold: 100,
            degraded_latency_ms: 2000,
            history_capacity: 100,
        }
    }
}

impl HealthSettings {
    pub fn validate(&self) -> FleetResult<()> {
        if self.check_interval_seconds == 0 {
            return Err(FleetError::Configuration("检查间隔必须大于0".to_string()));
        }
        if self.probe_timeout_seconds == 0 {
            return Err(FleetError::Configuration("探测超时时间必须大于0".to_string()));
        }
        if self.failure_threshold == 0 {
            return Err(FleetError::Configuration("失败阈值必须大于0".to_string()));
        }
        if !(self.degraded_load_threshold > 0.0 && self.degraded_load_threshold <= 1.0) {
            return Err(FleetError::Configuration(format!(
                "降级负载阈值必须在 (0, 1] 之间，实际为 {}",
                self.degraded_load_threshold
            )));
        }
        if self.history_capacity == 0 {
            return Err(FleetError::Configuration("历史记录容量必须大于0".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoverySettings {
    /// 发现端点（协调器地址）
    pub endpoints: Vec<String>,
    pub sweep_interval_seconds: u64,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            sweep_interval_seconds: 300,
        }
    }
}

impl DiscoverySettings {
    pub fn validate(&self) -> FleetResult<()> {
        if !self.endpoints.is_empty() && self.sweep_interval_seconds == 0 {
            return Err(FleetError::Configuration("发现间隔必须大于0".to_string()));
        }
        if self.endpoints.iter().any(|e| e.trim().is_empty()) {
            return Err(FleetError::Configuration("发现端点不能为空".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub metrics_enabled: bool,
    pub metrics_listen_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_listen_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn validate(&self) -> FleetResult<()> {
        if self.metrics_enabled && !self.metrics_listen_address.contains(':') {
            return Err(FleetError::Configuration(
                "指标监听地址格式无效，应为 host:port".to_string(),
            ));
        }
        Ok(())
    }
}

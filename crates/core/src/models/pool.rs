use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::health::HealthCheckRecord;
use crate::errors::{FleetError, FleetResult};

/// 工作池类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum PoolType {
    /// 本地进程组
    LocalProcess,
    /// 容器编排组
    ContainerOrchestrated,
    /// 远程委托组
    DelegatedRemote,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::LocalProcess => "local-process",
            PoolType::ContainerOrchestrated => "container-orchestrated",
            PoolType::DelegatedRemote => "delegated-remote",
        }
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 工作池健康状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HealthStatus {
    #[serde(rename = "HEALTHY")]
    Healthy,
    #[serde(rename = "DEGRADED")]
    Degraded,
    #[serde(rename = "UNAVAILABLE")]
    Unavailable,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "HEALTHY",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Unavailable => "UNAVAILABLE",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_health_status() -> HealthStatus {
    HealthStatus::Healthy
}

/// 工作池描述
///
/// 注册表以 `name` 为键独占持有描述实例，其余组件只拿到快照副本。
///
/// # 字段说明
///
/// - `capabilities`: 工作池声明的能力标签，如 "python"、"gpu"
/// - `max_workers`: 最大并发工作者数，必须 ≥ 1
/// - `current_workers`: 当前占用的工作者数，始终满足 `0 ≤ current_workers ≤ max_workers`
/// - `queue_size`: 尚未开始的积压任务数
/// - `region`: 可选的区域标签，供 REGION_AWARE 路由使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolDescriptor {
    pub name: String,
    pub pool_type: PoolType,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    pub max_workers: u32,
    #[serde(default)]
    pub current_workers: u32,
    #[serde(default)]
    pub queue_size: u32,
    #[serde(default = "default_health_status")]
    pub health_status: HealthStatus,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PoolDescriptor {
    /// 创建新的工作池描述，初始状态为 HEALTHY 且无负载
    pub fn new(
        name: impl Into<String>,
        pool_type: PoolType,
        endpoint: impl Into<String>,
        max_workers: u32,
    ) -> Self {
        Self {
            name: name.into(),
            pool_type,
            endpoint: endpoint.into(),
            capabilities: BTreeSet::new(),
            max_workers,
            current_workers: 0,
            queue_size: 0,
            health_status: HealthStatus::Healthy,
            region: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// 获取负载率，`max_workers` 为 0 时返回 0
    pub fn load_factor(&self) -> f64 {
        if self.max_workers == 0 {
            0.0
        } else {
            self.current_workers as f64 / self.max_workers as f64
        }
    }

    /// 检查工作池是否可以接受新任务
    pub fn is_available(&self) -> bool {
        self.health_status != HealthStatus::Unavailable && self.current_workers < self.max_workers
    }

    /// 能力是否覆盖全部要求
    pub fn has_capabilities(&self, required: &BTreeSet<String>) -> bool {
        required.is_subset(&self.capabilities)
    }

    /// 与要求能力的交集大小
    pub fn capability_overlap(&self, required: &BTreeSet<String>) -> usize {
        self.capabilities.intersection(required).count()
    }

    /// 校验描述是否可以注册
    pub fn validate(&self) -> FleetResult<()> {
        if self.name.trim().is_empty() {
            return Err(FleetError::InvalidPool("工作池名称不能为空".to_string()));
        }
        if self.endpoint.trim().is_empty() {
            return Err(FleetError::InvalidPool(format!(
                "工作池 {} 的端点不能为空",
                self.name
            )));
        }
        if self.max_workers == 0 {
            return Err(FleetError::InvalidPool(format!(
                "工作池 {} 的 max_workers 必须大于0",
                self.name
            )));
        }
        if self.current_workers > self.max_workers {
            return Err(FleetError::InvalidPool(format!(
                "工作池 {} 的 current_workers ({}) 超过 max_workers ({})",
                self.name, self.current_workers, self.max_workers
            )));
        }
        Ok(())
    }

    /// 原子地写入健康状态与容量，`current_workers` 会被截断到 `max_workers`
    pub fn apply_health(&mut self, status: HealthStatus, current_workers: u32, queue_size: u32) {
        self.health_status = status;
        self.current_workers = current_workers.min(self.max_workers);
        self.queue_size = queue_size;
    }

    /// 用新描述的静态字段刷新自身，保留监控写入的运行时字段
    pub fn refresh_static_fields(&mut self, incoming: PoolDescriptor) {
        self.pool_type = incoming.pool_type;
        self.endpoint = incoming.endpoint;
        self.capabilities = incoming.capabilities;
        self.max_workers = incoming.max_workers;
        self.region = incoming.region;
        self.metadata = incoming.metadata;
        self.current_workers = self.current_workers.min(self.max_workers);
    }
}

/// 工作池状态查询结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    pub descriptor: PoolDescriptor,
    pub last_check: Option<HealthCheckRecord>,
}

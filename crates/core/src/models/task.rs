use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{FleetError, FleetResult};

pub const MIN_TIMEOUT_SECONDS: u64 = 1;
pub const MAX_TIMEOUT_SECONDS: u64 = 3600;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const MAX_PRIORITY: u8 = 100;
pub const DEFAULT_PRIORITY: u8 = 50;

/// 元数据中携带区域提示的键
pub const REGION_METADATA_KEY: &str = "region";

/// 路由策略
///
/// 封闭集合，新增策略需要同时扩展此枚举与选择逻辑中的 `match`。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingStrategy {
    #[default]
    LeastLoaded,
    RoundRobin,
    CapabilityBased,
    RegionAware,
    Affinity,
}

impl RoutingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingStrategy::LeastLoaded => "LEAST_LOADED",
            RoutingStrategy::RoundRobin => "ROUND_ROBIN",
            RoutingStrategy::CapabilityBased => "CAPABILITY_BASED",
            RoutingStrategy::RegionAware => "REGION_AWARE",
            RoutingStrategy::Affinity => "AFFINITY",
        }
    }
}

impl fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 任务结果状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskStatus {
    /// 是否为终止状态，终止后不再改变
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskStatus::Pending | TaskStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Timeout => "TIMEOUT",
            TaskStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_TIMEOUT_SECONDS
}

fn default_priority() -> u8 {
    DEFAULT_PRIORITY
}

/// 待路由的分布式任务
///
/// `payload` 对协调核心不透明；`priority` 仅随任务携带，不参与排队。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedTask {
    #[serde(default)]
    pub task_id: String,
    pub task_type: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub required_capabilities: BTreeSet<String>,
    #[serde(default)]
    pub routing_strategy: RoutingStrategy,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DistributedTask {
    /// 创建新任务并生成唯一ID
    pub fn new(task_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            task_id: generate_task_id(),
            task_type: task_type.into(),
            payload,
            required_capabilities: BTreeSet::new(),
            routing_strategy: RoutingStrategy::default(),
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            priority: DEFAULT_PRIORITY,
            metadata: HashMap::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.routing_strategy = strategy;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.metadata.insert(
            REGION_METADATA_KEY.to_string(),
            serde_json::Value::String(region.into()),
        );
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    /// 元数据中的区域提示
    pub fn region_hint(&self) -> Option<&str> {
        self.metadata
            .get(REGION_METADATA_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// 调用方未提供ID时补一个
    pub fn ensure_task_id(&mut self) {
        if self.task_id.trim().is_empty() {
            self.task_id = generate_task_id();
        }
    }

    pub fn validate(&self) -> FleetResult<()> {
        if self.task_type.trim().is_empty() {
            return Err(FleetError::InvalidTask("任务类型不能为空".to_string()));
        }
        if !(MIN_TIMEOUT_SECONDS..=MAX_TIMEOUT_SECONDS).contains(&self.timeout_seconds) {
            return Err(FleetError::InvalidTask(format!(
                "任务超时时间必须在 {MIN_TIMEOUT_SECONDS}-{MAX_TIMEOUT_SECONDS} 秒之间，实际为 {}",
                self.timeout_seconds
            )));
        }
        if self.priority > MAX_PRIORITY {
            return Err(FleetError::InvalidTask(format!(
                "任务优先级必须在 0-{MAX_PRIORITY} 之间，实际为 {}",
                self.priority
            )));
        }
        Ok(())
    }
}

pub fn generate_task_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 单次提交到单个工作池的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributedTaskResult {
    pub task_id: String,
    pub pool_name: String,
    pub status: TaskStatus,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    /// 耗时（秒）
    pub duration: f64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl DistributedTaskResult {
    fn with_status(task_id: &str, pool_name: &str, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.to_string(),
            pool_name: pool_name.to_string(),
            status,
            output: None,
            error: None,
            duration: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn pending(task_id: &str, pool_name: &str) -> Self {
        Self::with_status(task_id, pool_name, TaskStatus::Pending)
    }

    pub fn running(task_id: &str, pool_name: &str) -> Self {
        Self::with_status(task_id, pool_name, TaskStatus::Running)
    }

    pub fn timeout(task_id: &str, pool_name: &str, duration: Duration) -> Self {
        let mut result = Self::with_status(task_id, pool_name, TaskStatus::Timeout);
        result.error = Some(format!("任务在 {:.3} 秒内未返回", duration.as_secs_f64()));
        result.duration = duration.as_secs_f64();
        result
    }

    pub fn failed(task_id: &str, pool_name: &str, error: impl Into<String>, duration: Duration) -> Self {
        let mut result = Self::with_status(task_id, pool_name, TaskStatus::Failed);
        result.error = Some(error.into());
        result.duration = duration.as_secs_f64();
        result
    }

    pub fn cancelled(task_id: &str, pool_name: &str, duration: Duration) -> Self {
        let mut result = Self::with_status(task_id, pool_name, TaskStatus::Cancelled);
        result.duration = duration.as_secs_f64();
        result
    }

    /// 根据工作池的返回构造结果；非 COMPLETED/FAILED 的返回视为失败
    pub fn from_response(
        task_id: &str,
        pool_name: &str,
        response: PoolSubmitResponse,
        duration: Duration,
    ) -> Self {
        let mut result = Self::with_status(task_id, pool_name, response.status);
        result.output = response.output;
        result.error = response.error;
        result.metadata = response.metadata;
        result.duration = duration.as_secs_f64();

        if !matches!(response.status, TaskStatus::Completed | TaskStatus::Failed) {
            result.status = TaskStatus::Failed;
            result.error = Some(format!(
                "工作池返回了非预期的状态: {}",
                response.status
            ));
        }
        result
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// 工作池对 `submit` 的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSubmitResponse {
    pub status: TaskStatus,
    #[serde(default)]
    pub output: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PoolSubmitResponse {
    pub fn completed(output: serde_json::Value) -> Self {
        Self {
            status: TaskStatus::Completed,
            output: Some(output),
            error: None,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: TaskStatus::Failed,
            output: None,
            error: Some(error.into()),
            metadata: HashMap::new(),
        }
    }
}

/// 工作池对 `cancel` 的应答
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelAck {
    pub acknowledged: bool,
    #[serde(default)]
    pub message: Option<String>,
}

/// 取消信号的投递结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CancelOutcome {
    /// 信号已送达，本地结果已标记为 CANCELLED；`acknowledged` 为远端应答，不代表远端已停止
    Delivered { acknowledged: bool },
    /// 结果已是终止状态，保持不变
    AlreadyTerminal(TaskStatus),
    /// 信号未能送达，本地结果保持不变
    NotDelivered { error: String },
}

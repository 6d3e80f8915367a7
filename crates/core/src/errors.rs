use thiserror::Error;

/// 协调器错误类型定义
///
/// 路由/查找类错误（任务能否被尝试）以 `Err` 同步返回；
/// 执行结果类错误（尝试是否成功）一律记录为 `DistributedTaskResult`，不在这里出现。
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("工作池已存在: {name}")]
    DuplicatePool { name: String },

    #[error("工作池未找到: {name}")]
    PoolNotFound { name: String },

    #[error("没有满足能力要求的可用工作池: 任务 {task_id}, 需要 {required:?}")]
    NoCapablePools {
        task_id: String,
        required: Vec<String>,
    },

    #[error("任务未找到: {task_id}")]
    TaskNotFound { task_id: String },

    #[error("无效的工作池描述: {0}")]
    InvalidPool(String),

    #[error("无效的任务参数: {0}")]
    InvalidTask(String),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("操作超时: {0}")]
    Timeout(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for FleetError {
    fn from(err: serde_json::Error) -> Self {
        FleetError::Serialization(err.to_string())
    }
}

impl FleetError {
    pub fn pool_not_found(name: impl Into<String>) -> Self {
        FleetError::PoolNotFound { name: name.into() }
    }

    pub fn task_not_found(task_id: impl Into<String>) -> Self {
        FleetError::TaskNotFound {
            task_id: task_id.into(),
        }
    }

    /// 是否属于路由/查找阶段的错误
    pub fn is_routing_error(&self) -> bool {
        matches!(
            self,
            FleetError::DuplicatePool { .. }
                | FleetError::PoolNotFound { .. }
                | FleetError::NoCapablePools { .. }
                | FleetError::TaskNotFound { .. }
        )
    }
}

/// 统一的Result类型
pub type FleetResult<T> = std::result::Result<T, FleetError>;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pool::HealthStatus;

/// 一次健康探测的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckRecord {
    pub pool_name: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub timestamp: DateTime<Utc>,
    /// 探测后的连续失败计数
    pub consecutive_failures: u32,
    #[serde(default)]
    pub error: Option<String>,
}

/// 工作池 `health()` 的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolHealthReport {
    pub status: HealthStatus,
    pub current_workers: u32,
    pub queue_size: u32,
}

/// 健康状态变更事件，推送给告警接收方
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthTransitionEvent {
    pub pool_name: String,
    pub old_status: HealthStatus,
    pub new_status: HealthStatus,
    pub timestamp: DateTime<Utc>,
}

impl HealthTransitionEvent {
    pub fn new(pool_name: impl Into<String>, old_status: HealthStatus, new_status: HealthStatus) -> Self {
        Self {
            pool_name: pool_name.into(),
            old_status,
            new_status,
            timestamp: Utc::now(),
        }
    }
}

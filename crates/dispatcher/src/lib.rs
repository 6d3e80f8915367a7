//! 工作池调度核心
//!
//! - [`registry`]: 工作池注册表与发现合并
//! - [`strategies`]: 五种路由策略
//! - [`executor`]: 单池路由执行、结果记录与取消
//! - [`distributor`]: 扇出分发与结果聚合
//! - [`health_monitor`]: 周期探测与熔断
//!
//! 所有组件通过构造参数显式共享同一个 [`PoolRegistry`]，不存在全局单例。

pub mod distributor;
pub mod executor;
pub mod health_monitor;
pub mod health_tracker;
pub mod metrics;
pub mod registry;
pub mod strategies;
pub mod submission;

pub use distributor::{
    majority_output, AggregationStrategy, BroadcastOutcome, DistributionOutcome, DistributorConfig,
    TaskDistributor,
};
pub use executor::{ExecutorConfig, ExecutorStats, TaskExecutor};
pub use health_monitor::{HealthMonitorConfig, MonitorStats, PoolHealthMonitor, RoundSummary};
pub use health_tracker::PoolHealthTracker;
pub use registry::{DiscoverySummary, PoolRegistry, RegistryStats, UpsertOutcome};
pub use strategies::PoolSelector;
pub use submission::TaskSubmitter;

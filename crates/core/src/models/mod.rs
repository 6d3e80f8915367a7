//! # 数据模型
//!
//! 定义工作池协调核心的数据结构：工作池描述、分布式任务、任务结果和健康探测记录。
//!
//! ## 所有权
//!
//! - [`PoolDescriptor`] 由注册表独占持有，对外只暴露快照副本
//! - [`DistributedTask`] / [`DistributedTaskResult`] 由创建它们的执行器或分发器持有
//! - [`HealthCheckRecord`] 的历史由健康监控器持有
//!
//! ## 状态流转
//!
//! ### 任务结果
//! ```text
//! RUNNING → COMPLETED | FAILED | TIMEOUT | CANCELLED
//! ```
//! 结果只会进入终止状态一次，之后不再改变。
//!
//! ### 工作池健康
//! ```text
//! HEALTHY ⇄ DEGRADED → UNAVAILABLE (熔断打开)
//!                           ↓ 冷却结束 + 一次成功探测
//!                      HEALTHY | DEGRADED
//! ```

pub mod health;
pub mod pool;
pub mod task;

pub use health::*;
pub use pool::*;
pub use task::*;

//! 工作池协调核心库
//!
//! 提供数据模型、错误类型、工作池通信接口、熔断器状态机、配置与日志初始化，
//! 供 dispatcher、infrastructure 以及协调器二进制共享。

pub mod circuit_breaker;
pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod traits;

pub use circuit_breaker::*;
pub use errors::*;
pub use logging::{init_logging, LogConfig, LogFormat};
pub use models::{
    CancelAck, CancelOutcome, DistributedTask, DistributedTaskResult, HealthCheckRecord,
    HealthStatus, HealthTransitionEvent, PoolDescriptor, PoolHealthReport, PoolStatus,
    PoolSubmitResponse, PoolType, RoutingStrategy, TaskStatus,
};
pub use traits::{AlertSink, DiscoveryClient, NoopAlertSink, PoolTransport};

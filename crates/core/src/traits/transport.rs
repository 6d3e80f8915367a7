//! 工作池通信接口定义
//!
//! 协调核心只依赖请求/响应语义，具体传输（HTTP、gRPC 等）由实现方决定。
//!
//! ## 约定
//!
//! - 超时由调用方施加，实现不需要自行限时
//! - `Err` 表示传输层失败（连接拒绝、非 2xx 响应、解码失败等）
//! - 工作池自身报告的执行失败通过 `PoolSubmitResponse::status == FAILED` 表达，不是 `Err`
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use fleet_core::traits::PoolTransport;
//!
//! async fn probe(transport: &dyn PoolTransport, pool: &PoolDescriptor) -> FleetResult<()> {
//!     let report = transport.health(pool).await?;
//!     println!("{} 当前负载 {}/{}", pool.name, report.current_workers, pool.max_workers);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;

use crate::errors::FleetResult;
use crate::models::{CancelAck, DistributedTask, PoolDescriptor, PoolHealthReport, PoolSubmitResponse};

/// 工作池端点
#[async_trait]
pub trait PoolTransport: Send + Sync {
    /// 提交任务并等待工作池返回结果
    async fn submit(
        &self,
        pool: &PoolDescriptor,
        task: &DistributedTask,
    ) -> FleetResult<PoolSubmitResponse>;

    /// 健康探测
    async fn health(&self, pool: &PoolDescriptor) -> FleetResult<PoolHealthReport>;

    /// 发送取消信号，应答不代表远端已停止
    async fn cancel(&self, pool: &PoolDescriptor, task_id: &str) -> FleetResult<CancelAck>;
}

/// 工作池发现端点
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// 查询一个发现端点可达的工作池描述
    async fn discover(&self, endpoint: &str) -> FleetResult<Vec<PoolDescriptor>>;
}

//! 工作池协调器进程
//!
//! 把 `fleet-core` 的配置与日志、`fleet-dispatcher` 的调度组件以及
//! `fleet-infrastructure` 的 HTTP 传输组装成一个可运行的服务。

pub mod app;
pub mod shutdown;

pub use app::Coordinator;
pub use shutdown::{wait_for_shutdown_signal, ShutdownManager};

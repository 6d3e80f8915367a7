//! 协调器的外部接入实现
//!
//! - [`http_transport`]：基于 reqwest 的工作池传输与发现客户端
//! - [`alerting`]：健康状态变更的告警接收方

pub mod alerting;
pub mod http_transport;

pub use alerting::{ChannelAlertSink, CompositeAlertSink, TracingAlertSink};
pub use http_transport::{HttpDiscoveryClient, HttpPoolTransport, HttpTransportConfig};

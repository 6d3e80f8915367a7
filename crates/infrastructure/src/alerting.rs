use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};

use fleet_core::models::{HealthStatus, HealthTransitionEvent};
use fleet_core::traits::AlertSink;

/// 把状态变更写入日志，变为 UNAVAILABLE 时用 warn 级别
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn send(&self, event: HealthTransitionEvent) {
        if event.new_status == HealthStatus::Unavailable {
            warn!(
                pool = %event.pool_name,
                old_status = %event.old_status,
                new_status = %event.new_status,
                timestamp = %event.timestamp,
                "工作池不可用"
            );
        } else {
            info!(
                pool = %event.pool_name,
                old_status = %event.old_status,
                new_status = %event.new_status,
                timestamp = %event.timestamp,
                "工作池健康状态变更"
            );
        }
    }
}

/// 通过无界通道转发事件，接收端关闭后静默丢弃
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    sender: mpsc::UnboundedSender<HealthTransitionEvent>,
}

impl ChannelAlertSink {
    pub fn new(sender: mpsc::UnboundedSender<HealthTransitionEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::UnboundedReceiver<HealthTransitionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl AlertSink for ChannelAlertSink {
    fn send(&self, event: HealthTransitionEvent) {
        if self.sender.send(event).is_err() {
            tracing::debug!("告警接收端已关闭，丢弃事件");
        }
    }
}

/// 依次转发给多个接收方
#[derive(Default, Clone)]
pub struct CompositeAlertSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl CompositeAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlertSink for CompositeAlertSink {
    fn send(&self, event: HealthTransitionEvent) {
        for sink in &self.sinks {
            sink.send(event.clone());
        }
    }
}

use crate::models::HealthTransitionEvent;

/// 告警接收方
///
/// 健康监控器在每次状态变更时同步调用 `send`，实现不得阻塞。
pub trait AlertSink: Send + Sync {
    fn send(&self, event: HealthTransitionEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlertSink;

impl AlertSink for NoopAlertSink {
    fn send(&self, _event: HealthTransitionEvent) {}
}

//! 指标埋点
//!
//! 通过 `metrics` 门面发出；进程未安装 recorder 时全部为空操作。

use metrics::{counter, histogram};

use fleet_core::models::{DistributedTaskResult, HealthStatus};

pub const TASK_RESULTS_TOTAL: &str = "fleet_task_results_total";
pub const TASK_DURATION_SECONDS: &str = "fleet_task_duration_seconds";
pub const HEALTH_PROBES_TOTAL: &str = "fleet_health_probes_total";
pub const HEALTH_TRANSITIONS_TOTAL: &str = "fleet_health_transitions_total";
pub const CIRCUIT_OPENED_TOTAL: &str = "fleet_circuit_opened_total";

/// 探测结果标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success,
    Failure,
    Timeout,
    Skipped,
}

impl ProbeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Success => "success",
            ProbeOutcome::Failure => "failure",
            ProbeOutcome::Timeout => "timeout",
            ProbeOutcome::Skipped => "skipped",
        }
    }
}

pub fn record_task_result(result: &DistributedTaskResult) {
    counter!(
        TASK_RESULTS_TOTAL,
        "status" => result.status.as_str(),
        "pool" => result.pool_name.clone()
    )
    .increment(1);
    histogram!(TASK_DURATION_SECONDS).record(result.duration);
}

pub fn record_probe(outcome: ProbeOutcome) {
    counter!(HEALTH_PROBES_TOTAL, "outcome" => outcome.as_str()).increment(1);
}

pub fn record_transition(to: HealthStatus) {
    counter!(HEALTH_TRANSITIONS_TOTAL, "to" => to.as_str()).increment(1);
}

pub fn record_circuit_opened() {
    counter!(CIRCUIT_OPENED_TOTAL).increment(1);
}

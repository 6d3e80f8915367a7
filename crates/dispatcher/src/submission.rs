use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use fleet_core::models::{DistributedTask, DistributedTaskResult, PoolDescriptor, TaskStatus};
use fleet_core::traits::PoolTransport;

use crate::health_tracker::PoolHealthTracker;
use crate::metrics;

/// 单次提交路径，执行器与分发器共用
///
/// 每次提交都以任务自身的超时为上限，并可被取消令牌提前结束；
/// 返回值总是终止状态的结果，传输错误不会以 `Err` 形式向上传播。
#[derive(Clone)]
pub struct TaskSubmitter {
    transport: Arc<dyn PoolTransport>,
    tracker: Option<Arc<PoolHealthTracker>>,
}

impl TaskSubmitter {
    pub fn new(transport: Arc<dyn PoolTransport>) -> Self {
        Self {
            transport,
            tracker: None,
        }
    }

    /// 传输失败计入共享的连续失败计数
    pub fn with_health_tracker(mut self, tracker: Arc<PoolHealthTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn transport(&self) -> &Arc<dyn PoolTransport> {
        &self.transport
    }

    pub async fn submit(
        &self,
        pool: &PoolDescriptor,
        task: &DistributedTask,
        cancel: &CancellationToken,
    ) -> DistributedTaskResult {
        let start = Instant::now();
        debug!(task_id = %task.task_id, pool = %pool.name, "提交任务到工作池");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                DistributedTaskResult::cancelled(&task.task_id, &pool.name, start.elapsed())
            }
            outcome = tokio::time::timeout(task.timeout(), self.transport.submit(pool, task)) => {
                match outcome {
                    Ok(Ok(response)) => DistributedTaskResult::from_response(
                        &task.task_id,
                        &pool.name,
                        response,
                        start.elapsed(),
                    ),
                    Ok(Err(e)) => {
                        warn!(task_id = %task.task_id, pool = %pool.name, error = %e, "任务提交失败");
                        self.note_failure(&pool.name).await;
                        DistributedTaskResult::failed(&task.task_id, &pool.name, e.to_string(), start.elapsed())
                    }
                    Err(_) => {
                        warn!(
                            task_id = %task.task_id,
                            pool = %pool.name,
                            timeout_secs = task.timeout_seconds,
                            "任务执行超时，远端可能仍在运行"
                        );
                        DistributedTaskResult::timeout(&task.task_id, &pool.name, start.elapsed())
                    }
                }
            }
        };

        metrics::record_task_result(&result);
        if result.status == TaskStatus::Completed {
            debug!(
                task_id = %task.task_id,
                pool = %pool.name,
                duration = result.duration,
                "任务完成"
            );
        }
        result
    }

    async fn note_failure(&self, pool_name: &str) {
        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.record_submission_failure(pool_name).await {
                debug!(pool = %pool_name, error = %e, "无法记录提交失败");
            }
        }
    }
}

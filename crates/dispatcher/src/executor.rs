use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleet_core::config::ExecutorSettings;
use fleet_core::models::{
    CancelOutcome, DistributedTask, DistributedTaskResult, PoolDescriptor, RoutingStrategy,
    TaskStatus,
};
use fleet_core::{FleetError, FleetResult};

use crate::registry::PoolRegistry;
use crate::strategies::PoolSelector;
use crate::submission::TaskSubmitter;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// 取消信号投递的上限
    pub cancel_timeout: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self::from(&ExecutorSettings::default())
    }
}

impl From<&ExecutorSettings> for ExecutorConfig {
    fn from(settings: &ExecutorSettings) -> Self {
        Self {
            cancel_timeout: Duration::from_secs(settings.cancel_timeout_seconds),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutorStats {
    pub submitted: u64,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub cancelled: usize,
    pub affinity_entries: usize,
    pub round_robin_counter: usize,
}

struct TaskRecord {
    result: DistributedTaskResult,
    pool: PoolDescriptor,
    started_at: Instant,
    cancel: CancellationToken,
}

/// 任务执行器
///
/// 为单个任务选出一个满足能力要求的可用工作池，在任务超时内提交并记录结果。
/// 路由失败（没有可用工作池、参数非法）以 `Err` 返回；执行失败记录在结果里。
pub struct TaskExecutor {
    registry: Arc<PoolRegistry>,
    submitter: TaskSubmitter,
    selector: PoolSelector,
    /// task_type -> 最近一次成功完成的工作池
    affinity: RwLock<HashMap<String, String>>,
    tasks: RwLock<HashMap<String, TaskRecord>>,
    submitted: AtomicU64,
    config: ExecutorConfig,
}

impl TaskExecutor {
    pub fn new(registry: Arc<PoolRegistry>, submitter: TaskSubmitter, config: ExecutorConfig) -> Self {
        Self {
            registry,
            submitter,
            selector: PoolSelector::new(),
            affinity: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            submitted: AtomicU64::new(0),
            config,
        }
    }

    /// 路由并执行任务，返回终止状态的结果
    pub async fn execute_task(
        &self,
        mut task: DistributedTask,
        strategy_override: Option<RoutingStrategy>,
    ) -> FleetResult<DistributedTaskResult> {
        task.ensure_task_id();
        task.validate()?;
        if self.tasks.read().await.contains_key(&task.task_id) {
            return Err(duplicate_task(&task.task_id));
        }

        let capable: Vec<PoolDescriptor> = self
            .registry
            .get_active_pools()
            .await
            .into_iter()
            .filter(|p| p.has_capabilities(&task.required_capabilities))
            .collect();
        if capable.is_empty() {
            warn!(
                task_id = %task.task_id,
                required = ?task.required_capabilities,
                "没有满足能力要求的可用工作池"
            );
            return Err(FleetError::NoCapablePools {
                task_id: task.task_id.clone(),
                required: task.required_capabilities.iter().cloned().collect(),
            });
        }

        let strategy = strategy_override.unwrap_or(task.routing_strategy);
        let affinity_pool = self.affinity.read().await.get(&task.task_type).cloned();
        let pool = self
            .selector
            .select(strategy, &task, &capable, affinity_pool.as_deref())
            .cloned()
            .ok_or_else(|| FleetError::Internal("路由策略未选出工作池".to_string()))?;

        let cancel = CancellationToken::new();
        {
            let mut tasks = self.tasks.write().await;
            if tasks.contains_key(&task.task_id) {
                return Err(duplicate_task(&task.task_id));
            }
            tasks.insert(
                task.task_id.clone(),
                TaskRecord {
                    result: DistributedTaskResult::running(&task.task_id, &pool.name),
                    pool: pool.clone(),
                    started_at: Instant::now(),
                    cancel: cancel.clone(),
                },
            );
        }
        self.submitted.fetch_add(1, Ordering::Relaxed);
        info!(
            task_id = %task.task_id,
            task_type = %task.task_type,
            strategy = %strategy,
            pool = %pool.name,
            "任务已分派"
        );

        let result = self.submitter.submit(&pool, &task, &cancel).await;
        let result = self.finalize(result).await;

        if result.status == TaskStatus::Completed {
            self.affinity
                .write()
                .await
                .insert(task.task_type.clone(), pool.name.clone());
        }
        Ok(result)
    }

    /// 写入最终结果；已被标记为终止状态（例如取消）的结果保持不变
    async fn finalize(&self, result: DistributedTaskResult) -> DistributedTaskResult {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&result.task_id) {
            Some(record) if record.result.is_terminal() => {
                debug!(
                    task_id = %result.task_id,
                    kept = %record.result.status,
                    discarded = %result.status,
                    "结果已是终止状态，忽略迟到的结果"
                );
                record.result.clone()
            }
            Some(record) => {
                record.result = result.clone();
                result
            }
            None => result,
        }
    }

    pub async fn get_task_status(&self, task_id: &str) -> FleetResult<DistributedTaskResult> {
        self.tasks
            .read()
            .await
            .get(task_id)
            .map(|r| r.result.clone())
            .ok_or_else(|| FleetError::task_not_found(task_id))
    }

    /// 向所属工作池发送取消信号
    ///
    /// 信号送达即把本地结果标记为 CANCELLED 并结束本地等待；远端是否真正停止不做保证。
    pub async fn cancel_task(&self, task_id: &str) -> FleetResult<CancelOutcome> {
        let (pool, status) = {
            let tasks = self.tasks.read().await;
            let record = tasks
                .get(task_id)
                .ok_or_else(|| FleetError::task_not_found(task_id))?;
            (record.pool.clone(), record.result.status)
        };
        if status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(status));
        }

        let delivery = tokio::time::timeout(
            self.config.cancel_timeout,
            self.submitter.transport().cancel(&pool, task_id),
        )
        .await;

        let ack = match delivery {
            Ok(Ok(ack)) => ack,
            Ok(Err(e)) => {
                warn!(task_id = %task_id, pool = %pool.name, error = %e, "取消信号投递失败");
                return Ok(CancelOutcome::NotDelivered {
                    error: e.to_string(),
                });
            }
            Err(_) => {
                warn!(task_id = %task_id, pool = %pool.name, "取消信号投递超时");
                return Ok(CancelOutcome::NotDelivered {
                    error: format!(
                        "取消信号在 {} 秒内未送达",
                        self.config.cancel_timeout.as_secs_f64()
                    ),
                });
            }
        };

        let mut tasks = self.tasks.write().await;
        let record = tasks
            .get_mut(task_id)
            .ok_or_else(|| FleetError::task_not_found(task_id))?;
        if record.result.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal(record.result.status));
        }
        record.result =
            DistributedTaskResult::cancelled(task_id, &pool.name, record.started_at.elapsed());
        record.cancel.cancel();

        info!(
            task_id = %task_id,
            pool = %pool.name,
            acknowledged = ack.acknowledged,
            "任务已取消"
        );
        Ok(CancelOutcome::Delivered {
            acknowledged: ack.acknowledged,
        })
    }

    /// 任务类型的亲和工作池
    pub async fn get_affinity(&self, task_type: &str) -> Option<String> {
        self.affinity.read().await.get(task_type).cloned()
    }

    pub async fn get_executor_stats(&self) -> ExecutorStats {
        let tasks = self.tasks.read().await;
        let mut stats = ExecutorStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            affinity_entries: self.affinity.read().await.len(),
            round_robin_counter: self.selector.round_robin_counter(),
            ..Default::default()
        };
        for record in tasks.values() {
            match record.result.status {
                TaskStatus::Pending | TaskStatus::Running => stats.running += 1,
                TaskStatus::Completed => stats.completed += 1,
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Timeout => stats.timed_out += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }
}

fn duplicate_task(task_id: &str) -> FleetError {
    FleetError::InvalidTask(format!("任务ID已提交过: {task_id}"))
}

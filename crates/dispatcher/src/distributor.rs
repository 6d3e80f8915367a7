use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleet_core::config::DistributorSettings;
use fleet_core::models::{DistributedTask, DistributedTaskResult, PoolDescriptor, TaskStatus};
use fleet_core::{FleetError, FleetResult};

use crate::registry::PoolRegistry;
use crate::submission::TaskSubmitter;

/// 扇出结果的聚合方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationStrategy {
    /// 第一个 COMPLETED 即返回
    FirstSuccess,
    /// 等待全部提交进入终止状态，名称指等待条件而非过滤
    #[default]
    AllSuccess,
    /// 超过半数终止后，取 COMPLETED 中出现最多的输出
    Majority,
}

impl AggregationStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationStrategy::FirstSuccess => "first_success",
            AggregationStrategy::AllSuccess => "all_success",
            AggregationStrategy::Majority => "majority",
        }
    }
}

impl fmt::Display for AggregationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationStrategy {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "first_success" => Ok(AggregationStrategy::FirstSuccess),
            "all_success" => Ok(AggregationStrategy::AllSuccess),
            "majority" => Ok(AggregationStrategy::Majority),
            other => Err(FleetError::InvalidTask(format!("未知的聚合策略: {other}"))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub max_parallel_tasks: usize,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self::from(&DistributorSettings::default())
    }
}

impl From<&DistributorSettings> for DistributorConfig {
    fn from(settings: &DistributorSettings) -> Self {
        Self {
            max_parallel_tasks: settings.max_parallel_tasks.max(1),
        }
    }
}

/// `distribute_task` 的返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistributionOutcome {
    pub strategy: AggregationStrategy,
    /// 与输入工作池列表一一对应
    pub results: Vec<DistributedTaskResult>,
    /// first_success 下为第一个完成的结果，majority 下为获胜输出最早出现的结果
    pub winner: Option<DistributedTaskResult>,
    pub majority_output: Option<serde_json::Value>,
}

impl DistributionOutcome {
    fn empty(strategy: AggregationStrategy) -> Self {
        Self {
            strategy,
            results: Vec::new(),
            winner: None,
            majority_output: None,
        }
    }

    pub fn completed_count(&self) -> usize {
        self.results.iter().filter(|r| r.is_completed()).count()
    }
}

/// `broadcast_task` 的返回，按工作池名称索引
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastOutcome {
    pub strategy: AggregationStrategy,
    pub results: BTreeMap<String, DistributedTaskResult>,
    pub winner: Option<DistributedTaskResult>,
    pub majority_output: Option<serde_json::Value>,
}

impl From<DistributionOutcome> for BroadcastOutcome {
    fn from(outcome: DistributionOutcome) -> Self {
        Self {
            strategy: outcome.strategy,
            results: outcome
                .results
                .into_iter()
                .map(|r| (r.pool_name.clone(), r))
                .collect(),
            winner: outcome.winner,
            majority_output: outcome.majority_output,
        }
    }
}

/// 在 COMPLETED 结果中找出出现次数最多的输出
///
/// 返回该输出第一次出现的下标与输出值；次数相同时取最先出现的输出。缺失的输出按 `null` 计。
pub fn majority_output(results: &[DistributedTaskResult]) -> Option<(usize, serde_json::Value)> {
    let mut groups: Vec<(serde_json::Value, usize, usize)> = Vec::new();

    for (index, result) in results.iter().enumerate() {
        if result.status != TaskStatus::Completed {
            continue;
        }
        let output = result.output.clone().unwrap_or(serde_json::Value::Null);
        match groups.iter_mut().find(|(value, _, _)| *value == output) {
            Some((_, count, _)) => *count += 1,
            None => groups.push((output, 1, index)),
        }
    }

    let mut best: Option<&(serde_json::Value, usize, usize)> = None;
    for group in &groups {
        if best.map_or(true, |b| group.1 > b.1) {
            best = Some(group);
        }
    }
    best.map(|(value, _, index)| (*index, value.clone()))
}

/// 任务分发器
///
/// 把同一个任务并发提交到调用方给定的多个工作池，并发数受 `max_parallel_tasks` 限制，
/// 超出部分按输入顺序排队。结果按输入下标写入预分配的槽位，与完成顺序无关。
pub struct TaskDistributor {
    registry: Arc<PoolRegistry>,
    submitter: TaskSubmitter,
    config: DistributorConfig,
}

impl TaskDistributor {
    /// `max_parallel_tasks` 为 0 时按 1 处理，否则分发永远拿不到并发额度
    pub fn new(
        registry: Arc<PoolRegistry>,
        submitter: TaskSubmitter,
        mut config: DistributorConfig,
    ) -> Self {
        config.max_parallel_tasks = config.max_parallel_tasks.max(1);
        Self {
            registry,
            submitter,
            config,
        }
    }

    pub async fn distribute_task(
        &self,
        mut task: DistributedTask,
        pools: Vec<PoolDescriptor>,
        strategy: AggregationStrategy,
    ) -> FleetResult<DistributionOutcome> {
        task.ensure_task_id();
        task.validate()?;

        let total = pools.len();
        if total == 0 {
            debug!(task_id = %task.task_id, "没有目标工作池，跳过分发");
            return Ok(DistributionOutcome::empty(strategy));
        }

        info!(
            task_id = %task.task_id,
            pools = total,
            max_parallel = self.config.max_parallel_tasks,
            strategy = %strategy,
            "开始扇出分发任务"
        );

        let task = Arc::new(task);
        let pool_names: Vec<String> = pools.iter().map(|p| p.name.clone()).collect();
        let started: Arc<Vec<AtomicBool>> =
            Arc::new((0..total).map(|_| AtomicBool::new(false)).collect());
        let admission = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel::<(usize, DistributedTaskResult)>(total);

        let driver = {
            let semaphore = Arc::new(Semaphore::new(self.config.max_parallel_tasks));
            let submitter = self.submitter.clone();
            let task = task.clone();
            let started = started.clone();
            let admission = admission.clone();

            tokio::spawn(async move {
                for (index, pool) in pools.into_iter().enumerate() {
                    let permit = tokio::select! {
                        biased;
                        _ = admission.cancelled() => break,
                        permit = semaphore.clone().acquire_owned() => match permit {
                            Ok(permit) => permit,
                            Err(_) => break,
                        },
                    };
                    started[index].store(true, Ordering::SeqCst);

                    let tx = tx.clone();
                    let submitter = submitter.clone();
                    let task = task.clone();
                    tokio::spawn(async move {
                        let result = submitter
                            .submit(&pool, &task, &CancellationToken::new())
                            .await;
                        drop(permit);
                        // 调用方已提前返回时接收端可能已关闭
                        let _ = tx.send((index, result)).await;
                    });
                }
            })
        };

        let mut slots: Vec<Option<DistributedTaskResult>> = vec![None; total];
        let mut received = 0usize;
        let mut first_completed: Option<usize> = None;
        let mut resolved_early = false;

        while received < total {
            let Some((index, result)) = rx.recv().await else {
                break;
            };
            received += 1;
            if first_completed.is_none() && result.is_completed() {
                first_completed = Some(index);
            }
            slots[index] = Some(result);

            let satisfied = match strategy {
                AggregationStrategy::FirstSuccess => first_completed.is_some(),
                AggregationStrategy::Majority => received * 2 > total,
                AggregationStrategy::AllSuccess => false,
            };
            if satisfied && received < total {
                resolved_early = true;
                break;
            }
        }

        admission.cancel();
        if let Err(e) = driver.await {
            warn!(task_id = %task.task_id, error = %e, "分发调度任务异常退出");
        }

        let results: Vec<DistributedTaskResult> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    let pool_name = &pool_names[index];
                    let was_started = started[index].load(Ordering::SeqCst);
                    if resolved_early && was_started {
                        DistributedTaskResult::running(&task.task_id, pool_name)
                    } else if resolved_early {
                        DistributedTaskResult::pending(&task.task_id, pool_name)
                    } else {
                        DistributedTaskResult::failed(
                            &task.task_id,
                            pool_name,
                            "提交任务异常退出，未返回结果",
                            std::time::Duration::ZERO,
                        )
                    }
                })
            })
            .collect();

        let (winner, majority_value) = match strategy {
            AggregationStrategy::FirstSuccess => {
                (first_completed.map(|i| results[i].clone()), None)
            }
            AggregationStrategy::Majority => match majority_output(&results) {
                Some((index, value)) => (Some(results[index].clone()), Some(value)),
                None => (None, None),
            },
            AggregationStrategy::AllSuccess => (None, None),
        };

        info!(
            task_id = %task.task_id,
            received,
            total,
            completed = results.iter().filter(|r| r.is_completed()).count(),
            resolved_early,
            "扇出分发完成"
        );

        Ok(DistributionOutcome {
            strategy,
            results,
            winner,
            majority_output: majority_value,
        })
    }

    /// 按名称从注册表取出工作池后分发，任一名称未注册即失败
    pub async fn distribute_to_named(
        &self,
        task: DistributedTask,
        pool_names: &[String],
        strategy: AggregationStrategy,
    ) -> FleetResult<DistributionOutcome> {
        let mut pools = Vec::with_capacity(pool_names.len());
        for name in pool_names {
            pools.push(self.registry.get_pool(name).await?);
        }
        self.distribute_task(task, pools, strategy).await
    }

    /// 分发到调用时刻所有可用的工作池
    pub async fn broadcast_task(
        &self,
        task: DistributedTask,
        strategy: AggregationStrategy,
    ) -> FleetResult<BroadcastOutcome> {
        let pools = self.registry.get_active_pools().await;
        if pools.is_empty() {
            warn!(task_id = %task.task_id, "广播时没有可用的工作池");
        }
        let outcome = self.distribute_task(task, pools, strategy).await?;
        Ok(outcome.into())
    }
}

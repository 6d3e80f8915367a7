use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use fleet_core::circuit_breaker::{
    CircuitBreakerConfig, CircuitSnapshot, CircuitState, CircuitTransition, PoolCircuitBreaker,
    ProbePermit,
};
use fleet_core::models::{HealthCheckRecord, HealthStatus, HealthTransitionEvent, PoolHealthReport};
use fleet_core::traits::AlertSink;
use fleet_core::FleetResult;

use crate::metrics;
use crate::registry::PoolRegistry;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// 熔断器及其所属的注册代次
struct TrackedBreaker {
    generation: u64,
    breaker: PoolCircuitBreaker,
}

/// 每个工作池的熔断器、连续失败计数与探测历史
///
/// 健康监控器与任务提交路径共用同一个实例，因此执行失败同样会累计到熔断计数上。
/// 熔断器锁在写回注册表期间保持持有，保证同一工作池的状态写入按记录顺序生效。
/// 熔断器与历史绑定注册代次，工作池注销后重新注册时从关闭状态重新开始。
pub struct PoolHealthTracker {
    registry: Arc<PoolRegistry>,
    breaker_config: CircuitBreakerConfig,
    breakers: Mutex<HashMap<String, TrackedBreaker>>,
    history: RwLock<HashMap<String, VecDeque<HealthCheckRecord>>>,
    history_capacity: usize,
    alert_sink: Arc<dyn AlertSink>,
}

impl PoolHealthTracker {
    pub fn new(
        registry: Arc<PoolRegistry>,
        breaker_config: CircuitBreakerConfig,
        history_capacity: usize,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            registry,
            breaker_config,
            breakers: Mutex::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            history_capacity: history_capacity.max(1),
            alert_sink,
        }
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    /// 询问熔断器本轮能否探测该工作池
    pub async fn acquire_probe(&self, pool_name: &str) -> ProbePermit {
        let mut breakers = self.breakers.lock().await;
        self.breaker_mut(&mut breakers, pool_name)
            .await
            .try_acquire_probe(Instant::now())
    }

    /// 释放未产生结果的试探许可
    pub async fn abandon_probe(&self, pool_name: &str) {
        if let Some(tracked) = self.breakers.lock().await.get_mut(pool_name) {
            tracked.breaker.abandon_trial();
        }
    }

    /// 记录一次成功的探测
    ///
    /// `observed` 为按负载/延迟分类后的状态。若熔断器在探测期间被打开（例如执行失败触发），
    /// 结果被忽略，工作池保持 UNAVAILABLE。
    pub async fn record_probe_success(
        &self,
        pool_name: &str,
        observed: HealthStatus,
        report: &PoolHealthReport,
        response_time_ms: u64,
    ) -> FleetResult<HealthStatus> {
        let mut breakers = self.breakers.lock().await;
        let breaker = self.breaker_mut(&mut breakers, pool_name).await;

        let transition = breaker.record_success();
        let status = if breaker.state() == CircuitState::Open {
            debug!(pool = %pool_name, "熔断器处于打开状态，忽略探测结果");
            HealthStatus::Unavailable
        } else {
            observed
        };
        if transition == CircuitTransition::Closed {
            info!(pool = %pool_name, status = %status, "试探探测成功，熔断器关闭");
        }

        let record = HealthCheckRecord {
            pool_name: pool_name.to_string(),
            status,
            response_time_ms,
            timestamp: Utc::now(),
            consecutive_failures: breaker.consecutive_failures(),
            error: None,
        };

        let result = self
            .write_back(record, Some((report.current_workers, report.queue_size)))
            .await;
        drop(breakers);
        result
    }

    /// 记录一次失败或超时的探测
    pub async fn record_probe_failure(
        &self,
        pool_name: &str,
        error: String,
        response_time_ms: u64,
    ) -> FleetResult<HealthStatus> {
        let mut breakers = self.breakers.lock().await;
        let breaker = self.breaker_mut(&mut breakers, pool_name).await;

        let transition = breaker.record_failure(Instant::now());
        self.log_transition(pool_name, transition, breaker.consecutive_failures());
        let status = if breaker.is_open() {
            HealthStatus::Unavailable
        } else {
            HealthStatus::Degraded
        };

        let record = HealthCheckRecord {
            pool_name: pool_name.to_string(),
            status,
            response_time_ms,
            timestamp: Utc::now(),
            consecutive_failures: breaker.consecutive_failures(),
            error: Some(error),
        };

        let result = self.write_back(record, None).await;
        drop(breakers);
        result
    }

    /// 记录一次提交层面的失败（网络/传输错误）
    ///
    /// 只累加计数；达到阈值时打开熔断器并将工作池置为 UNAVAILABLE，
    /// 不会重置已在进行中的冷却。
    pub async fn record_submission_failure(&self, pool_name: &str) -> FleetResult<()> {
        let mut breakers = self.breakers.lock().await;
        let breaker = self.breaker_mut(&mut breakers, pool_name).await;

        let transition = breaker.record_external_failure(Instant::now());
        let consecutive_failures = breaker.consecutive_failures();
        debug!(
            pool = %pool_name,
            consecutive_failures,
            "提交失败计入连续失败次数"
        );
        self.log_transition(pool_name, transition, consecutive_failures);

        if transition == CircuitTransition::Opened {
            let old_status = self
                .registry
                .set_health_status(pool_name, HealthStatus::Unavailable)
                .await?;
            self.emit(pool_name, old_status, HealthStatus::Unavailable);
        }
        Ok(())
    }

    /// 保留仍在注册表中的工作池，返回被丢弃的名称
    pub async fn retain_pools(&self, known: &[String]) -> Vec<String> {
        let mut breakers = self.breakers.lock().await;
        let mut history = self.history.write().await;

        let mut stale: Vec<String> = breakers
            .keys()
            .chain(history.keys())
            .filter(|name| !known.contains(name))
            .cloned()
            .collect();
        stale.sort();
        stale.dedup();

        for name in &stale {
            breakers.remove(name);
            history.remove(name);
        }
        stale
    }

    /// 最近的探测记录，最旧的在前
    pub async fn history(&self, pool_name: &str) -> Vec<HealthCheckRecord> {
        let generation = self.registry.pool_generation(pool_name).await;
        let tracked = self.breakers.lock().await.get(pool_name).map(|t| t.generation);
        if tracked.is_some() && tracked != generation {
            return Vec::new();
        }
        self.history
            .read()
            .await
            .get(pool_name)
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn circuit_snapshot(&self, pool_name: &str) -> CircuitSnapshot {
        let now = Instant::now();
        let generation = self.registry.pool_generation(pool_name).await;
        let breakers = self.breakers.lock().await;
        match breakers.get(pool_name) {
            Some(tracked) if Some(tracked.generation) == generation => tracked.breaker.snapshot(now),
            _ => PoolCircuitBreaker::new(self.breaker_config.clone()).snapshot(now),
        }
    }

    pub async fn consecutive_failures(&self, pool_name: &str) -> u32 {
        let generation = self.registry.pool_generation(pool_name).await;
        match self.breakers.lock().await.get(pool_name) {
            Some(tracked) if Some(tracked.generation) == generation => {
                tracked.breaker.consecutive_failures()
            }
            _ => 0,
        }
    }

    /// 当前未关闭的熔断器数量，只统计仍在册的注册代次
    pub async fn open_circuits(&self) -> usize {
        let generations = self.registry.pool_generations().await;
        self.breakers
            .lock()
            .await
            .iter()
            .filter(|(name, tracked)| generations.get(*name) == Some(&tracked.generation))
            .filter(|(_, tracked)| tracked.breaker.is_open())
            .count()
    }

    /// 取出工作池的熔断器
    ///
    /// 记录的代次与注册表不一致时说明工作池被注销后重新注册，旧熔断器与历史一并丢弃。
    async fn breaker_mut<'a>(
        &self,
        breakers: &'a mut HashMap<String, TrackedBreaker>,
        pool_name: &str,
    ) -> &'a mut PoolCircuitBreaker {
        let generation = self.registry.pool_generation(pool_name).await.unwrap_or(0);
        let stale = breakers
            .get(pool_name)
            .is_some_and(|tracked| tracked.generation != generation);
        if stale {
            info!(pool = %pool_name, "工作池已重新注册，重置熔断器与探测历史");
            breakers.remove(pool_name);
            self.history.write().await.remove(pool_name);
        }

        &mut breakers
            .entry(pool_name.to_string())
            .or_insert_with(|| TrackedBreaker {
                generation,
                breaker: PoolCircuitBreaker::new(self.breaker_config.clone()),
            })
            .breaker
    }

    async fn write_back(
        &self,
        record: HealthCheckRecord,
        capacity: Option<(u32, u32)>,
    ) -> FleetResult<HealthStatus> {
        let pool_name = record.pool_name.clone();
        let new_status = record.status;

        let old_status = self
            .registry
            .apply_health_check(record.clone(), capacity)
            .await?;
        self.push_history(record).await;

        if old_status != new_status {
            self.emit(&pool_name, old_status, new_status);
        }
        Ok(new_status)
    }

    async fn push_history(&self, record: HealthCheckRecord) {
        let mut history = self.history.write().await;
        let records = history
            .entry(record.pool_name.clone())
            .or_insert_with(|| VecDeque::with_capacity(self.history_capacity));
        while records.len() >= self.history_capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    fn log_transition(&self, pool_name: &str, transition: CircuitTransition, failures: u32) {
        match transition {
            CircuitTransition::Opened => {
                metrics::record_circuit_opened();
                warn!(
                    pool = %pool_name,
                    consecutive_failures = failures,
                    cooldown_secs = self.breaker_config.cooldown.as_secs(),
                    "连续失败达到阈值，熔断器打开"
                );
            }
            CircuitTransition::Reopened => {
                metrics::record_circuit_opened();
                warn!(pool = %pool_name, "试探探测失败，重新进入冷却");
            }
            CircuitTransition::Closed | CircuitTransition::None => {}
        }
    }

    fn emit(&self, pool_name: &str, old_status: HealthStatus, new_status: HealthStatus) {
        metrics::record_transition(new_status);
        info!(
            pool = %pool_name,
            old_status = %old_status,
            new_status = %new_status,
            "工作池健康状态变更"
        );
        self.alert_sink
            .send(HealthTransitionEvent::new(pool_name, old_status, new_status));
    }
}

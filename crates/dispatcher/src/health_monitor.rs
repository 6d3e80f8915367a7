use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fleet_core::circuit_breaker::{CircuitBreakerConfig, CircuitSnapshot, ProbePermit};
use fleet_core::config::HealthSettings;
use fleet_core::models::{HealthCheckRecord, HealthStatus, PoolDescriptor, PoolHealthReport};
use fleet_core::traits::PoolTransport;
use fleet_core::{FleetError, FleetResult};

use crate::health_tracker::PoolHealthTracker;
use crate::metrics::{self, ProbeOutcome};
use crate::registry::PoolRegistry;

/// 健康监控运行时配置
#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    pub check_interval: Duration,
    pub probe_timeout: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub degraded_load_threshold: f64,
    pub degraded_queue_threshold: u32,
    pub degraded_latency: Duration,
    pub history_capacity: usize,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self::from(&HealthSettings::default())
    }
}

impl From<&HealthSettings> for HealthMonitorConfig {
    fn from(settings: &HealthSettings) -> Self {
        Self {
            check_interval: Duration::from_secs(settings.check_interval_seconds),
            probe_timeout: Duration::from_secs(settings.probe_timeout_seconds),
            failure_threshold: settings.failure_threshold,
            cooldown: Duration::from_secs(settings.cooldown_seconds),
            degraded_load_threshold: settings.degraded_load_threshold,
            degraded_queue_threshold: settings.degraded_queue_threshold,
            degraded_latency: Duration::from_millis(settings.degraded_latency_ms),
            history_capacity: settings.history_capacity,
        }
    }
}

impl HealthMonitorConfig {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            cooldown: self.cooldown,
        }
    }

    /// 按负载、积压与响应时间对一次成功的探测分类
    ///
    /// 三项都是严格超过阈值才算 DEGRADED，恰好等于阈值仍为 HEALTHY。
    pub fn classify(
        &self,
        pool: &PoolDescriptor,
        report: &PoolHealthReport,
        response_time: Duration,
    ) -> HealthStatus {
        let load = if pool.max_workers == 0 {
            0.0
        } else {
            report.current_workers.min(pool.max_workers) as f64 / pool.max_workers as f64
        };

        if report.status == HealthStatus::Degraded
            || load > self.degraded_load_threshold
            || report.queue_size > self.degraded_queue_threshold
            || response_time > self.degraded_latency
        {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

/// 一轮探测的汇总
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub probed: usize,
    pub failed: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MonitorStats {
    pub running: bool,
    pub rounds: u64,
    pub probes: u64,
    pub failed_probes: u64,
    pub skipped_probes: u64,
    pub open_circuits: usize,
}

struct MonitorInner {
    registry: Arc<PoolRegistry>,
    transport: Arc<dyn PoolTransport>,
    tracker: Arc<PoolHealthTracker>,
    config: HealthMonitorConfig,
    /// 同一时刻只有一轮探测
    round_lock: Mutex<()>,
    rounds: AtomicU64,
    probes: AtomicU64,
    failed_probes: AtomicU64,
    skipped_probes: AtomicU64,
}

impl MonitorInner {
    async fn run_round(&self) -> RoundSummary {
        let _round = self.round_lock.lock().await;

        let pools = self.registry.get_all_pools().await;
        let names: Vec<String> = pools.iter().map(|p| p.name.clone()).collect();
        let stale = self.tracker.retain_pools(&names).await;
        if !stale.is_empty() {
            debug!(pools = ?stale, "清理已注销工作池的健康状态");
        }

        let outcomes = join_all(pools.iter().map(|pool| self.probe_pool(pool))).await;

        let mut summary = RoundSummary::default();
        for outcome in outcomes {
            match outcome {
                ProbeOutcome::Success => summary.probed += 1,
                ProbeOutcome::Failure | ProbeOutcome::Timeout => {
                    summary.probed += 1;
                    summary.failed += 1;
                }
                ProbeOutcome::Skipped => summary.skipped += 1,
            }
        }

        self.rounds.fetch_add(1, Ordering::Relaxed);
        self.probes.fetch_add(summary.probed as u64, Ordering::Relaxed);
        self.failed_probes
            .fetch_add(summary.failed as u64, Ordering::Relaxed);
        self.skipped_probes
            .fetch_add(summary.skipped as u64, Ordering::Relaxed);

        debug!(
            probed = summary.probed,
            failed = summary.failed,
            skipped = summary.skipped,
            "健康检查轮次完成"
        );
        summary
    }

    async fn probe_pool(&self, pool: &PoolDescriptor) -> ProbeOutcome {
        if let ProbePermit::Rejected { remaining } = self.tracker.acquire_probe(&pool.name).await {
            debug!(
                pool = %pool.name,
                remaining_ms = remaining.as_millis() as u64,
                "熔断器打开，跳过探测"
            );
            metrics::record_probe(ProbeOutcome::Skipped);
            return ProbeOutcome::Skipped;
        }

        let start = Instant::now();
        let response = tokio::time::timeout(self.config.probe_timeout, self.transport.health(pool)).await;
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        let (outcome, write) = match response {
            Ok(Ok(report)) if report.status != HealthStatus::Unavailable => {
                let observed = self.config.classify(pool, &report, elapsed);
                (
                    ProbeOutcome::Success,
                    self.tracker
                        .record_probe_success(&pool.name, observed, &report, elapsed_ms)
                        .await,
                )
            }
            Ok(Ok(_)) => (
                ProbeOutcome::Failure,
                self.tracker
                    .record_probe_failure(&pool.name, "工作池报告不可用".to_string(), elapsed_ms)
                    .await,
            ),
            Ok(Err(e)) => {
                debug!(pool = %pool.name, error = %e, "健康探测失败");
                (
                    ProbeOutcome::Failure,
                    self.tracker
                        .record_probe_failure(&pool.name, e.to_string(), elapsed_ms)
                        .await,
                )
            }
            Err(_) => {
                debug!(pool = %pool.name, timeout_ms = self.config.probe_timeout.as_millis() as u64, "健康探测超时");
                (
                    ProbeOutcome::Timeout,
                    self.tracker
                        .record_probe_failure(
                            &pool.name,
                            format!("探测在 {}ms 内未返回", self.config.probe_timeout.as_millis()),
                            elapsed_ms,
                        )
                        .await,
                )
            }
        };

        if let Err(e) = write {
            // 探测期间工作池被注销
            debug!(pool = %pool.name, error = %e, "探测结果未能写回注册表");
            self.tracker.abandon_probe(&pool.name).await;
        }
        metrics::record_probe(outcome);
        outcome
    }
}

/// 工作池健康监控器
///
/// 按 `check_interval` 周期性探测所有已注册的工作池，驱动熔断器并把健康状态写回注册表。
/// 状态变更事件交给告警接收方，监控器不等待投递结果。
pub struct PoolHealthMonitor {
    inner: Arc<MonitorInner>,
    worker: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl PoolHealthMonitor {
    pub fn new(
        tracker: Arc<PoolHealthTracker>,
        transport: Arc<dyn PoolTransport>,
        config: HealthMonitorConfig,
    ) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                registry: tracker.registry().clone(),
                transport,
                tracker,
                config,
                round_lock: Mutex::new(()),
                rounds: AtomicU64::new(0),
                probes: AtomicU64::new(0),
                failed_probes: AtomicU64::new(0),
                skipped_probes: AtomicU64::new(0),
            }),
            worker: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.inner.config
    }

    pub fn tracker(&self) -> &Arc<PoolHealthTracker> {
        &self.inner.tracker
    }

    /// 立即执行一轮探测
    ///
    /// 探测在独立任务中运行，调用方中途放弃等待也不会遗留半途的试探许可。
    pub async fn check_all_pools(&self) -> RoundSummary {
        let inner = self.inner.clone();
        match tokio::spawn(async move { inner.run_round().await }).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "健康检查轮次异常退出");
                RoundSummary::default()
            }
        }
    }

    /// 启动周期性探测，重复调用无副作用
    pub async fn start(&self) {
        let mut worker = self.worker.lock().await;
        if let Some((_, handle)) = worker.as_ref() {
            if !handle.is_finished() {
                warn!("健康监控器已在运行");
                return;
            }
        }

        let token = CancellationToken::new();
        let inner = self.inner.clone();
        let loop_token = token.clone();
        let handle = tokio::spawn(async move {
            info!(
                interval_secs = inner.config.check_interval.as_secs_f64(),
                "健康监控循环启动"
            );
            loop {
                inner.run_round().await;
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = tokio::time::sleep(inner.config.check_interval) => {}
                }
            }
            info!("健康监控循环已退出");
        });

        *worker = Some((token, handle));
    }

    /// 停止周期性探测，等待进行中的探测轮次结束后返回
    pub async fn stop(&self) {
        let worker = self.worker.lock().await.take();
        if let Some((token, handle)) = worker {
            token.cancel();
            if let Err(e) = handle.await {
                warn!(error = %e, "健康监控循环异常退出");
            }
        }
        // 等待手动触发的轮次
        let _round = self.inner.round_lock.lock().await;
        info!("健康监控器已停止");
    }

    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// 最近的探测记录，最旧的在前
    pub async fn get_pool_history(&self, pool_name: &str) -> FleetResult<Vec<HealthCheckRecord>> {
        if !self.inner.registry.contains(pool_name).await {
            return Err(FleetError::pool_not_found(pool_name));
        }
        Ok(self.inner.tracker.history(pool_name).await)
    }

    pub async fn get_circuit_state(&self, pool_name: &str) -> FleetResult<CircuitSnapshot> {
        if !self.inner.registry.contains(pool_name).await {
            return Err(FleetError::pool_not_found(pool_name));
        }
        Ok(self.inner.tracker.circuit_snapshot(pool_name).await)
    }

    pub async fn get_monitor_stats(&self) -> MonitorStats {
        MonitorStats {
            running: self.is_running().await,
            rounds: self.inner.rounds.load(Ordering::Relaxed),
            probes: self.inner.probes.load(Ordering::Relaxed),
            failed_probes: self.inner.failed_probes.load(Ordering::Relaxed),
            skipped_probes: self.inner.skipped_probes.load(Ordering::Relaxed),
            open_circuits: self.inner.tracker.open_circuits().await,
        }
    }
}

impl Drop for PoolHealthMonitor {
    fn drop(&mut self) {
        if let Some((token, _)) = self.worker.get_mut().as_ref() {
            token.cancel();
        }
    }
}

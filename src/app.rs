use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_core::config::AppConfig;
use fleet_core::traits::{AlertSink, DiscoveryClient, PoolTransport};
use fleet_dispatcher::{
    DiscoverySummary, DistributorConfig, ExecutorConfig, HealthMonitorConfig, PoolHealthMonitor,
    PoolHealthTracker, PoolRegistry, TaskDistributor, TaskExecutor, TaskSubmitter,
};
use fleet_infrastructure::{HttpDiscoveryClient, HttpPoolTransport, TracingAlertSink};
use tokio::sync::broadcast;
use tracing::{error, info};

/// 协调器进程
///
/// 持有共享的注册表以及执行器、分发器、健康监控器。`run` 负责静态工作池注册、
/// 周期发现与健康监控的生命周期，收到关闭信号后停止后台任务。
pub struct Coordinator {
    config: AppConfig,
    registry: Arc<PoolRegistry>,
    executor: Arc<TaskExecutor>,
    distributor: Arc<TaskDistributor>,
    monitor: Arc<PoolHealthMonitor>,
}

impl Coordinator {
    /// 使用 HTTP 传输和日志告警创建协调器
    pub fn new(config: AppConfig) -> Result<Self> {
        let transport = Arc::new(HttpPoolTransport::new().context("创建HTTP工作池传输失败")?);
        let discovery: Option<Arc<dyn DiscoveryClient>> = if config.discovery.endpoints.is_empty() {
            None
        } else {
            let timeout = Duration::from_secs(config.health.probe_timeout_seconds);
            Some(Arc::new(
                HttpDiscoveryClient::new(timeout).context("创建HTTP发现客户端失败")?,
            ))
        };
        Ok(Self::with_components(
            config,
            transport,
            discovery,
            Arc::new(TracingAlertSink),
        ))
    }

    pub fn with_components(
        config: AppConfig,
        transport: Arc<dyn PoolTransport>,
        discovery: Option<Arc<dyn DiscoveryClient>>,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Self {
        info!("初始化协调器组件");

        let mut registry = PoolRegistry::with_settings(config.registry.clone());
        if let Some(client) = discovery {
            registry = registry.with_discovery_client(client);
        }
        let registry = Arc::new(registry);

        let monitor_config = HealthMonitorConfig::from(&config.health);
        let tracker = Arc::new(PoolHealthTracker::new(
            registry.clone(),
            monitor_config.breaker_config(),
            monitor_config.history_capacity,
            alert_sink,
        ));
        let submitter = TaskSubmitter::new(transport.clone()).with_health_tracker(tracker.clone());

        let executor = Arc::new(TaskExecutor::new(
            registry.clone(),
            submitter.clone(),
            ExecutorConfig::from(&config.executor),
        ));
        let distributor = Arc::new(TaskDistributor::new(
            registry.clone(),
            submitter,
            DistributorConfig::from(&config.distributor),
        ));
        let monitor = Arc::new(PoolHealthMonitor::new(tracker, transport, monitor_config));

        Self {
            config,
            registry,
            executor,
            distributor,
            monitor,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PoolRegistry> {
        &self.registry
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.executor
    }

    pub fn distributor(&self) -> &Arc<TaskDistributor> {
        &self.distributor
    }

    pub fn monitor(&self) -> &Arc<PoolHealthMonitor> {
        &self.monitor
    }

    /// 注册配置文件中的静态工作池，返回注册数量
    pub async fn register_static_pools(&self) -> Result<usize> {
        for pool in &self.config.pools {
            self.registry
                .register_pool(pool.clone())
                .await
                .with_context(|| format!("注册静态工作池 {} 失败", pool.name))?;
            info!(pool = %pool.name, pool_type = %pool.pool_type, endpoint = %pool.endpoint, "注册静态工作池");
        }
        Ok(self.config.pools.len())
    }

    /// 执行一次发现轮次，未配置发现端点时返回 `None`
    pub async fn run_discovery_sweep(&self) -> Option<DiscoverySummary> {
        run_discovery_sweep(&self.registry, &self.config.discovery.endpoints).await
    }

    /// 运行到收到关闭信号为止
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let registered = self.register_static_pools().await?;
        info!("静态工作池注册完成: {registered} 个");

        let discovery_handle = if self.config.discovery.endpoints.is_empty() {
            None
        } else {
            let registry = Arc::clone(&self.registry);
            let endpoints = self.config.discovery.endpoints.clone();
            let interval = Duration::from_secs(self.config.discovery.sweep_interval_seconds);
            let shutdown_rx = shutdown_rx.resubscribe();

            Some(tokio::spawn(async move {
                run_discovery_loop(registry, endpoints, interval, shutdown_rx).await;
            }))
        };

        self.monitor.start().await;

        let _ = shutdown_rx.recv().await;
        info!("协调器收到关闭信号");

        self.monitor.stop().await;
        if let Some(handle) = discovery_handle {
            if let Err(e) = handle.await {
                error!("发现循环异常退出: {e}");
            }
        }

        let stats = self.executor.get_executor_stats().await;
        info!(
            submitted = stats.submitted,
            completed = stats.completed,
            failed = stats.failed,
            running = stats.running,
            "协调器已停止"
        );
        Ok(())
    }
}

async fn run_discovery_sweep(
    registry: &PoolRegistry,
    endpoints: &[String],
) -> Option<DiscoverySummary> {
    if endpoints.is_empty() {
        return None;
    }
    // 注册表自行记录端点失败与轮次汇总
    match registry.discover_pools(endpoints).await {
        Ok(summary) => Some(summary),
        Err(e) => {
            error!("发现轮次失败: {e}");
            None
        }
    }
}

/// 周期发现循环，首个轮次立即执行
async fn run_discovery_loop(
    registry: Arc<PoolRegistry>,
    endpoints: Vec<String>,
    period: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let mut interval = tokio::time::interval(period);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_discovery_sweep(&registry, &endpoints).await;
            }
            _ = shutdown_rx.recv() => {
                info!("发现循环收到关闭信号");
                break;
            }
        }
    }
}

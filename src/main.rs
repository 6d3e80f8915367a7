use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fleet_coordinator::{wait_for_shutdown_signal, Coordinator, ShutdownManager};
use fleet_core::config::AppConfig;
use fleet_core::{init_logging, LogFormat};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fleet-coordinator")]
#[command(about = "分布式工作池协调系统")]
#[command(version)]
struct Args {
    /// 配置文件路径，缺省时按默认路径查找
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// 日志格式: pretty, json, compact
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(args.config.as_deref()).with_context(|| {
        format!(
            "加载配置失败: {}",
            args.config.as_deref().unwrap_or("<默认路径>")
        )
    })?;
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }

    init_logging(&config.logging)?;
    info!("启动分布式工作池协调系统");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config
            .observability
            .metrics_listen_address
            .parse()
            .with_context(|| {
                format!("指标监听地址无效: {}", config.observability.metrics_listen_address)
            })?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("安装Prometheus指标导出器失败")?;
        info!("Prometheus指标导出器已启动: {addr}");
    }

    let coordinator = Arc::new(Coordinator::new(config)?);
    let shutdown_manager = ShutdownManager::new();

    let mut app_handle = {
        let coordinator = Arc::clone(&coordinator);
        let shutdown_rx = shutdown_manager.subscribe().await;

        tokio::spawn(async move {
            if let Err(e) = coordinator.run(shutdown_rx).await {
                error!("协调器运行失败: {e:#}");
            }
        })
    };

    tokio::select! {
        _ = wait_for_shutdown_signal() => {}
        result = &mut app_handle => {
            // 启动阶段失败时不再等待信号
            if let Err(e) = result {
                error!("协调器任务异常退出: {e}");
            }
            return Err(anyhow::anyhow!("协调器提前退出"));
        }
    }
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown().await;

    match tokio::time::timeout(Duration::from_secs(30), app_handle).await {
        Ok(Ok(())) => info!("协调器已优雅关闭"),
        Ok(Err(e)) => error!("协调器关闭时发生错误: {e}"),
        Err(_) => warn!("协调器关闭超时，强制退出"),
    }

    info!("分布式工作池协调系统已退出");
    Ok(())
}

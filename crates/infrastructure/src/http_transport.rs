//! 基于 HTTP 的工作池传输与发现客户端
//!
//! | 操作 | 请求 |
//! |---|---|
//! | 提交 | `POST {endpoint}/tasks`，请求体为任务 JSON |
//! | 健康 | `GET {endpoint}/health` |
//! | 取消 | `POST {endpoint}/tasks/{task_id}/cancel` |
//! | 发现 | `GET {coordinator}/pools` |
//!
//! 超时由调用方施加，这里只设置连接超时。

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tracing::debug;

use fleet_core::models::{
    CancelAck, DistributedTask, PoolDescriptor, PoolHealthReport, PoolSubmitResponse,
};
use fleet_core::traits::{DiscoveryClient, PoolTransport};
use fleet_core::{FleetError, FleetResult};

#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            user_agent: format!("fleet-coordinator/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn build_client(config: &HttpTransportConfig) -> FleetResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(config.connect_timeout)
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| FleetError::Configuration(format!("创建HTTP客户端失败: {e}")))
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

fn send_error(url: &str, err: reqwest::Error) -> FleetError {
    if err.is_timeout() {
        FleetError::Timeout(format!("{url}: {err}"))
    } else {
        FleetError::Network(format!("{url}: {err}"))
    }
}

/// 检查状态码，非 2xx 时把状态与响应体带回
async fn checked(response: reqwest::Response, url: &str) -> FleetResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(FleetError::Network(format!("HTTP {status} from {url}: {body}")))
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response, url: &str) -> FleetResult<T> {
    let response = checked(response, url).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| FleetError::Serialization(format!("解析 {url} 的响应失败: {e}")))
}

/// HTTP 工作池传输
#[derive(Debug, Clone)]
pub struct HttpPoolTransport {
    client: reqwest::Client,
}

impl HttpPoolTransport {
    pub fn new() -> FleetResult<Self> {
        Self::with_config(&HttpTransportConfig::default())
    }

    pub fn with_config(config: &HttpTransportConfig) -> FleetResult<Self> {
        Ok(Self {
            client: build_client(config)?,
        })
    }
}

#[async_trait]
impl PoolTransport for HttpPoolTransport {
    async fn submit(
        &self,
        pool: &PoolDescriptor,
        task: &DistributedTask,
    ) -> FleetResult<PoolSubmitResponse> {
        let url = join_url(&pool.endpoint, "tasks");
        debug!(pool = %pool.name, task_id = %task.task_id, url = %url, "HTTP 提交任务");

        let response = self
            .client
            .post(&url)
            .json(task)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        read_json(response, &url).await
    }

    async fn health(&self, pool: &PoolDescriptor) -> FleetResult<PoolHealthReport> {
        let url = join_url(&pool.endpoint, "health");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        read_json(response, &url).await
    }

    async fn cancel(&self, pool: &PoolDescriptor, task_id: &str) -> FleetResult<CancelAck> {
        let url = join_url(&pool.endpoint, &format!("tasks/{task_id}/cancel"));
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let response = checked(response, &url).await?;

        // 部分工作池只返回 2xx 空响应
        let body = response
            .text()
            .await
            .map_err(|e| FleetError::Network(format!("{url}: {e}")))?;
        if body.trim().is_empty() {
            return Ok(CancelAck {
                acknowledged: true,
                message: None,
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

/// HTTP 发现客户端
#[derive(Debug, Clone)]
pub struct HttpDiscoveryClient {
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpDiscoveryClient {
    pub fn new(request_timeout: Duration) -> FleetResult<Self> {
        Ok(Self {
            client: build_client(&HttpTransportConfig::default())?,
            request_timeout,
        })
    }
}

#[async_trait]
impl DiscoveryClient for HttpDiscoveryClient {
    async fn discover(&self, endpoint: &str) -> FleetResult<Vec<PoolDescriptor>> {
        let url = join_url(endpoint, "pools");
        let response = self
            .client
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let pools: Vec<PoolDescriptor> = read_json(response, &url).await?;
        debug!(endpoint = %endpoint, count = pools.len(), "发现端点返回工作池");
        Ok(pools)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_url_normalizes_slashes() {
        assert_eq!(join_url("http://p:8080", "tasks"), "http://p:8080/tasks");
        assert_eq!(join_url("http://p:8080/", "/health"), "http://p:8080/health");
        assert_eq!(
            join_url("http://p/api/", "tasks/t-1/cancel"),
            "http://p/api/tasks/t-1/cancel"
        );
    }

    #[test]
    fn test_default_config() {
        let config = HttpTransportConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
        assert!(config.user_agent.starts_with("fleet-coordinator/"));
        assert!(HttpPoolTransport::with_config(&config).is_ok());
    }
}

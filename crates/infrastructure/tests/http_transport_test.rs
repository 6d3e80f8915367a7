#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use fleet_core::models::{
        CancelAck, DistributedTask, HealthStatus, PoolDescriptor, PoolHealthReport, PoolType,
        PoolSubmitResponse, TaskStatus,
    };
    use fleet_core::traits::{DiscoveryClient, PoolTransport};
    use fleet_core::FleetError;
    use fleet_infrastructure::http_transport::{HttpDiscoveryClient, HttpPoolTransport};
    use serde_json::json;
    use tokio::net::TcpListener;

    async fn submit(Json(task): Json<DistributedTask>) -> Json<PoolSubmitResponse> {
        if task.task_type == "explode" {
            return Json(PoolSubmitResponse::failed("exit code 1"));
        }
        Json(PoolSubmitResponse::completed(json!({
            "task_id": task.task_id,
            "echo": task.payload,
        })))
    }

    async fn health() -> Json<PoolHealthReport> {
        Json(PoolHealthReport {
            status: HealthStatus::Healthy,
            current_workers: 3,
            queue_size: 7,
        })
    }

    async fn cancel(Path(task_id): Path<String>) -> Response {
        if task_id == "quiet" {
            return StatusCode::OK.into_response();
        }
        Json(CancelAck {
            acknowledged: false,
            message: Some(format!("{task_id} already finished")),
        })
        .into_response()
    }

    async fn pools() -> Json<serde_json::Value> {
        Json(json!([
            {
                "name": "remote-a",
                "pool_type": "delegated-remote",
                "endpoint": "http://a.remote",
                "capabilities": ["python"],
                "max_workers": 4
            },
            {
                "name": "remote-b",
                "pool_type": "container-orchestrated",
                "endpoint": "http://b.remote",
                "max_workers": 8,
                "current_workers": 2,
                "region": "eu-west"
            }
        ]))
    }

    async fn maintenance() -> (StatusCode, &'static str) {
        (StatusCode::SERVICE_UNAVAILABLE, "maintenance")
    }

    async fn garbled() -> &'static str {
        "definitely not json"
    }

    async fn slow_pools() -> Json<serde_json::Value> {
        tokio::time::sleep(Duration::from_secs(2)).await;
        Json(json!([]))
    }

    async fn spawn_server() -> String {
        let app = Router::new()
            .route("/tasks", post(submit))
            .route("/health", get(health))
            .route("/tasks/{task_id}/cancel", post(cancel))
            .route("/pools", get(pools))
            .route("/broken/health", get(maintenance))
            .route("/garbled/health", get(garbled))
            .route("/slow/pools", get(slow_pools));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn pool_at(endpoint: &str) -> PoolDescriptor {
        PoolDescriptor::new("http-pool", PoolType::LocalProcess, endpoint, 10)
    }

    #[tokio::test]
    async fn test_submit_round_trip() {
        let base = spawn_server().await;
        let transport = HttpPoolTransport::new().unwrap();
        let task = DistributedTask::new("echo", json!({"n": 1}));

        let response = transport.submit(&pool_at(&base), &task).await.unwrap();
        assert_eq!(response.status, TaskStatus::Completed);
        assert_eq!(
            response.output,
            Some(json!({"task_id": task.task_id, "echo": {"n": 1}}))
        );

        let failing = DistributedTask::new("explode", json!(null));
        let response = transport.submit(&pool_at(&base), &failing).await.unwrap();
        assert_eq!(response.status, TaskStatus::Failed);
        assert_eq!(response.error.as_deref(), Some("exit code 1"));
    }

    #[tokio::test]
    async fn test_health_with_trailing_slash_endpoint() {
        let base = spawn_server().await;
        let transport = HttpPoolTransport::new().unwrap();

        let report = transport.health(&pool_at(&format!("{base}/"))).await.unwrap();
        assert_eq!(report.status, HealthStatus::Healthy);
        assert_eq!(report.current_workers, 3);
        assert_eq!(report.queue_size, 7);
    }

    #[tokio::test]
    async fn test_non_success_status_is_network_error() {
        let base = spawn_server().await;
        let transport = HttpPoolTransport::new().unwrap();

        let err = transport
            .health(&pool_at(&format!("{base}/broken")))
            .await
            .unwrap_err();
        match err {
            FleetError::Network(message) => {
                assert!(message.contains("503"), "{message}");
                assert!(message.contains("maintenance"), "{message}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_undecodable_body_is_serialization_error() {
        let base = spawn_server().await;
        let transport = HttpPoolTransport::new().unwrap();

        let err = transport
            .health(&pool_at(&format!("{base}/garbled")))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_unreachable_pool_is_network_error() {
        let transport = HttpPoolTransport::new().unwrap();
        let err = transport
            .health(&pool_at("http://127.0.0.1:1"))
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::Network(_)));
    }

    #[tokio::test]
    async fn test_cancel_ack_and_empty_body() {
        let base = spawn_server().await;
        let transport = HttpPoolTransport::new().unwrap();
        let pool = pool_at(&base);

        let ack = transport.cancel(&pool, "t-42").await.unwrap();
        assert!(!ack.acknowledged);
        assert_eq!(ack.message.as_deref(), Some("t-42 already finished"));

        let ack = transport.cancel(&pool, "quiet").await.unwrap();
        assert!(ack.acknowledged);
        assert!(ack.message.is_none());
    }

    #[tokio::test]
    async fn test_discovery_decodes_descriptors() {
        let base = spawn_server().await;
        let client = HttpDiscoveryClient::new(Duration::from_secs(2)).unwrap();

        let pools = client.discover(&base).await.unwrap();
        assert_eq!(pools.len(), 2);
        assert_eq!(pools[0].name, "remote-a");
        assert_eq!(pools[0].pool_type, PoolType::DelegatedRemote);
        assert!(pools[0].capabilities.contains("python"));
        assert_eq!(pools[0].health_status, HealthStatus::Healthy);
        assert_eq!(pools[1].current_workers, 2);
        assert_eq!(pools[1].region.as_deref(), Some("eu-west"));
    }

    #[tokio::test]
    async fn test_discovery_times_out() {
        let base = spawn_server().await;
        let client = HttpDiscoveryClient::new(Duration::from_millis(200)).unwrap();

        let err = client.discover(&format!("{base}/slow")).await.unwrap_err();
        assert!(matches!(err, FleetError::Timeout(_)), "{err:?}");
    }
}

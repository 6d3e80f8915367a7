#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use fleet_core::circuit_breaker::CircuitBreakerConfig;
    use fleet_core::models::{
        CancelOutcome, HealthStatus, PoolDescriptor, RoutingStrategy, TaskStatus,
    };
    use fleet_core::FleetError;
    use fleet_dispatcher::executor::{ExecutorConfig, TaskExecutor};
    use fleet_dispatcher::health_tracker::PoolHealthTracker;
    use fleet_dispatcher::registry::PoolRegistry;
    use fleet_dispatcher::submission::TaskSubmitter;
    use fleet_testing_utils::{
        MockPoolTransport, PoolDescriptorBuilder, RecordingAlertSink, SubmitBehavior, TaskBuilder,
    };
    use serde_json::json;

    struct Harness {
        registry: Arc<PoolRegistry>,
        transport: Arc<MockPoolTransport>,
        executor: Arc<TaskExecutor>,
    }

    async fn harness(pools: Vec<PoolDescriptor>) -> Harness {
        harness_with_threshold(pools, 3).await
    }

    async fn harness_with_threshold(pools: Vec<PoolDescriptor>, threshold: u32) -> Harness {
        let registry = Arc::new(PoolRegistry::new());
        for pool in pools {
            registry.register_pool(pool).await.unwrap();
        }
        let transport = MockPoolTransport::shared();
        let tracker = Arc::new(PoolHealthTracker::new(
            registry.clone(),
            CircuitBreakerConfig {
                failure_threshold: threshold,
                cooldown: Duration::from_secs(60),
            },
            100,
            Arc::new(RecordingAlertSink::new()),
        ));
        let submitter = TaskSubmitter::new(transport.clone()).with_health_tracker(tracker);
        let executor = Arc::new(TaskExecutor::new(
            registry.clone(),
            submitter,
            ExecutorConfig {
                cancel_timeout: Duration::from_millis(200),
            },
        ));
        Harness {
            registry,
            transport,
            executor,
        }
    }

    fn pool(name: &str, current: u32, max: u32) -> PoolDescriptor {
        PoolDescriptorBuilder::new(name).with_workers(current, max).build()
    }

    #[tokio::test]
    async fn test_least_loaded_always_selects_lighter_pool() {
        let h = harness(vec![pool("A", 2, 10), pool("B", 8, 10)]).await;

        for _ in 0..5 {
            let task = TaskBuilder::new()
                .with_strategy(RoutingStrategy::LeastLoaded)
                .build();
            let result = h.executor.execute_task(task, None).await.unwrap();
            assert_eq!(result.pool_name, "A");
        }
    }

    #[tokio::test]
    async fn test_round_robin_sequence() {
        let h = harness(vec![pool("C", 0, 10), pool("A", 0, 10), pool("B", 0, 10)]).await;

        let mut selected = Vec::new();
        for _ in 0..6 {
            let task = TaskBuilder::new()
                .with_strategy(RoutingStrategy::RoundRobin)
                .build();
            selected.push(h.executor.execute_task(task, None).await.unwrap().pool_name);
        }
        assert_eq!(selected, vec!["A", "B", "C", "A", "B", "C"]);
        assert_eq!(h.transport.submitted_pools(), selected);
    }

    #[tokio::test]
    async fn test_strategy_override_takes_precedence() {
        let h = harness(vec![pool("A", 2, 10), pool("B", 8, 10)]).await;

        // 计数器从 0 开始，轮询先选 A；第二次选 B
        let task = TaskBuilder::new()
            .with_strategy(RoutingStrategy::LeastLoaded)
            .build();
        h.executor
            .execute_task(task, Some(RoutingStrategy::RoundRobin))
            .await
            .unwrap();
        let task = TaskBuilder::new()
            .with_strategy(RoutingStrategy::LeastLoaded)
            .build();
        let result = h
            .executor
            .execute_task(task, Some(RoutingStrategy::RoundRobin))
            .await
            .unwrap();
        assert_eq!(result.pool_name, "B");
    }

    #[tokio::test]
    async fn test_affinity_follows_last_completion() {
        let h = harness(vec![pool("A", 1, 10), pool("B", 5, 10)]).await;

        // 通过轮询把类型 X 的第一次成功落在 B 上
        let warmup = TaskBuilder::new().with_task_type("other").build();
        h.executor
            .execute_task(warmup, Some(RoutingStrategy::RoundRobin))
            .await
            .unwrap();
        let first = TaskBuilder::new().with_task_type("X").build();
        let result = h
            .executor
            .execute_task(first, Some(RoutingStrategy::RoundRobin))
            .await
            .unwrap();
        assert_eq!(result.pool_name, "B");
        assert_eq!(result.status, TaskStatus::Completed);

        let next = TaskBuilder::new()
            .with_task_type("X")
            .with_strategy(RoutingStrategy::Affinity)
            .build();
        let result = h.executor.execute_task(next, None).await.unwrap();
        assert_eq!(result.pool_name, "B");

        // B 不可用后回退到最小负载
        h.registry
            .set_health_status("B", HealthStatus::Unavailable)
            .await
            .unwrap();
        let fallback = TaskBuilder::new()
            .with_task_type("X")
            .with_strategy(RoutingStrategy::Affinity)
            .build();
        let result = h.executor.execute_task(fallback, None).await.unwrap();
        assert_eq!(result.pool_name, "A");
    }

    #[tokio::test]
    async fn test_gpu_task_routes_to_only_capable_pool() {
        let h = harness(vec![
            PoolDescriptorBuilder::new("local-1")
                .with_capabilities(vec!["python"])
                .with_workers(3, 10)
                .build(),
            PoolDescriptorBuilder::new("local-2")
                .with_capabilities(vec!["python", "gpu"])
                .with_workers(1, 5)
                .build(),
        ])
        .await;

        for strategy in [RoutingStrategy::CapabilityBased, RoutingStrategy::LeastLoaded] {
            let task = TaskBuilder::new()
                .with_required_capabilities(vec!["gpu"])
                .with_strategy(strategy)
                .build();
            let result = h.executor.execute_task(task, None).await.unwrap();
            assert_eq!(result.pool_name, "local-2", "strategy {strategy}");
            assert_eq!(result.status, TaskStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_region_aware_routing() {
        let h = harness(vec![
            PoolDescriptorBuilder::new("eu-1")
                .with_region("eu-west")
                .with_workers(6, 10)
                .build(),
            PoolDescriptorBuilder::new("us-1")
                .with_region("us-east")
                .with_workers(1, 10)
                .build(),
        ])
        .await;

        let task = TaskBuilder::new()
            .with_region("eu-west")
            .with_strategy(RoutingStrategy::RegionAware)
            .build();
        assert_eq!(
            h.executor.execute_task(task, None).await.unwrap().pool_name,
            "eu-1"
        );

        let task = TaskBuilder::new()
            .with_region("ap-south")
            .with_strategy(RoutingStrategy::RegionAware)
            .build();
        assert_eq!(
            h.executor.execute_task(task, None).await.unwrap().pool_name,
            "us-1"
        );
    }

    #[tokio::test]
    async fn test_timeout_resolves_within_task_timeout() {
        let h = harness(vec![pool("slow", 0, 10)]).await;
        h.transport.set_submit(
            "slow",
            SubmitBehavior::delayed(Duration::from_secs(10), SubmitBehavior::Complete(json!("late"))),
        );

        let task = TaskBuilder::new().with_id("t-slow").with_timeout_seconds(1).build();
        let start = Instant::now();
        let result = h.executor.execute_task(task, None).await.unwrap();

        assert!(start.elapsed() < Duration::from_secs(3));
        assert_eq!(result.status, TaskStatus::Timeout);
        assert_eq!(
            h.executor.get_task_status("t-slow").await.unwrap().status,
            TaskStatus::Timeout
        );
        // 超时不计入熔断，也不建立亲和
        assert!(h.executor.get_affinity("test_task").await.is_none());
    }

    #[tokio::test]
    async fn test_network_failures_trip_shared_breaker() {
        let h = harness_with_threshold(vec![pool("flaky", 0, 10)], 2).await;
        h.transport
            .set_submit("flaky", SubmitBehavior::NetworkError("connection reset".into()));

        for _ in 0..2 {
            let result = h
                .executor
                .execute_task(TaskBuilder::new().build(), None)
                .await
                .unwrap();
            assert_eq!(result.status, TaskStatus::Failed);
            assert!(result.error.unwrap().contains("connection reset"));
        }

        assert_eq!(
            h.registry.get_pool("flaky").await.unwrap().health_status,
            HealthStatus::Unavailable
        );
        let err = h
            .executor
            .execute_task(TaskBuilder::new().build(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::NoCapablePools { .. }));
    }

    #[tokio::test]
    async fn test_pool_reported_failure_does_not_trip_breaker() {
        let h = harness_with_threshold(vec![pool("p", 0, 10)], 1).await;
        h.transport
            .set_submit("p", SubmitBehavior::PoolFailure("exit code 1".into()));

        let result = h
            .executor
            .execute_task(TaskBuilder::new().build(), None)
            .await
            .unwrap();
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("exit code 1"));
        assert_eq!(
            h.registry.get_pool("p").await.unwrap().health_status,
            HealthStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_cancel_marks_result_and_ends_wait() {
        let h = harness(vec![pool("p", 0, 10)]).await;
        h.transport.set_submit("p", SubmitBehavior::Hang);

        let executor = h.executor.clone();
        let task = TaskBuilder::new().with_id("t-cancel").build();
        let running = tokio::spawn(async move { executor.execute_task(task, None).await });

        // 等待任务进入 RUNNING
        let mut status = None;
        for _ in 0..50 {
            if let Ok(result) = h.executor.get_task_status("t-cancel").await {
                status = Some(result.status);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(status, Some(TaskStatus::Running));

        let outcome = h.executor.cancel_task("t-cancel").await.unwrap();
        assert_eq!(outcome, CancelOutcome::Delivered { acknowledged: true });
        assert_eq!(
            h.executor.get_task_status("t-cancel").await.unwrap().status,
            TaskStatus::Cancelled
        );

        let result = tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(result.status, TaskStatus::Cancelled);
        assert_eq!(
            h.transport.cancels(),
            vec![("p".to_string(), "t-cancel".to_string())]
        );

        // 再次取消是空操作
        assert_eq!(
            h.executor.cancel_task("t-cancel").await.unwrap(),
            CancelOutcome::AlreadyTerminal(TaskStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_unacknowledged_cancel_still_marks_cancelled() {
        let h = harness(vec![pool("p", 0, 10)]).await;
        h.transport.set_submit("p", SubmitBehavior::Hang);
        h.transport.set_cancel_ack("p", false, Some("already running"));

        let executor = h.executor.clone();
        let task = TaskBuilder::new().with_id("t-ignored").with_priority(90).build();
        let running = tokio::spawn(async move { executor.execute_task(task, None).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let outcome = h.executor.cancel_task("t-ignored").await.unwrap();
        assert_eq!(outcome, CancelOutcome::Delivered { acknowledged: false });
        assert_eq!(
            h.executor.get_task_status("t-ignored").await.unwrap().status,
            TaskStatus::Cancelled
        );

        let result = tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(result.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_out_of_range_priority_is_rejected_before_submission() {
        let h = harness(vec![pool("p", 0, 10)]).await;
        let task = TaskBuilder::new().with_priority(101).build();

        assert!(matches!(
            h.executor.execute_task(task, None).await,
            Err(FleetError::InvalidTask(_))
        ));
        assert!(h.transport.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_undelivered_cancel_leaves_result_running() {
        let h = harness(vec![pool("p", 0, 10)]).await;
        h.transport.set_submit("p", SubmitBehavior::Hang);
        h.transport.set_cancel_unreachable("p");

        let executor = h.executor.clone();
        let task = TaskBuilder::new().with_id("t-stuck").with_timeout_seconds(1).build();
        let running = tokio::spawn(async move { executor.execute_task(task, None).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let outcome = h.executor.cancel_task("t-stuck").await.unwrap();
        assert!(matches!(outcome, CancelOutcome::NotDelivered { .. }));
        assert_eq!(
            h.executor.get_task_status("t-stuck").await.unwrap().status,
            TaskStatus::Running
        );

        let result = running.await.unwrap().unwrap();
        assert_eq!(result.status, TaskStatus::Timeout);
    }
}

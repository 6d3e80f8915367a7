#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use fleet_core::models::{HealthStatus, PoolDescriptor, TaskStatus};
    use fleet_core::FleetError;
    use fleet_dispatcher::distributor::{AggregationStrategy, DistributorConfig, TaskDistributor};
    use fleet_dispatcher::registry::PoolRegistry;
    use fleet_dispatcher::submission::TaskSubmitter;
    use fleet_testing_utils::{MockPoolTransport, PoolDescriptorBuilder, SubmitBehavior, TaskBuilder};
    use serde_json::json;

    async fn setup(
        pools: &[PoolDescriptor],
        max_parallel: usize,
    ) -> (TaskDistributor, Arc<MockPoolTransport>, Arc<PoolRegistry>) {
        let registry = Arc::new(PoolRegistry::new());
        for pool in pools {
            registry.register_pool(pool.clone()).await.unwrap();
        }
        let transport = MockPoolTransport::shared();
        let distributor = TaskDistributor::new(
            registry.clone(),
            TaskSubmitter::new(transport.clone()),
            DistributorConfig {
                max_parallel_tasks: max_parallel,
            },
        );
        (distributor, transport, registry)
    }

    fn pools(names: &[&str]) -> Vec<PoolDescriptor> {
        names
            .iter()
            .map(|n| PoolDescriptorBuilder::new(n).build())
            .collect()
    }

    fn delayed_complete(ms: u64, output: serde_json::Value) -> SubmitBehavior {
        SubmitBehavior::delayed(Duration::from_millis(ms), SubmitBehavior::Complete(output))
    }

    #[tokio::test]
    async fn test_results_follow_input_order() {
        let targets = pools(&["P1", "P2", "P3"]);
        let (distributor, transport, _) = setup(&targets, 10).await;
        transport.set_submit("P1", delayed_complete(150, json!(1)));
        transport.set_submit("P2", delayed_complete(10, json!(2)));
        transport.set_submit("P3", delayed_complete(80, json!(3)));

        let outcome = distributor
            .distribute_task(TaskBuilder::new().build(), targets, AggregationStrategy::AllSuccess)
            .await
            .unwrap();

        let names: Vec<&str> = outcome.results.iter().map(|r| r.pool_name.as_str()).collect();
        assert_eq!(names, vec!["P1", "P2", "P3"]);
        let outputs: Vec<_> = outcome.results.iter().map(|r| r.output.clone()).collect();
        assert_eq!(outputs, vec![Some(json!(1)), Some(json!(2)), Some(json!(3))]);
        assert!(outcome.winner.is_none());
    }

    #[tokio::test]
    async fn test_all_success_waits_for_every_outcome() {
        let targets = pools(&["ok", "bad", "down", "slow"]);
        let (distributor, transport, _) = setup(&targets, 10).await;
        transport.set_submit("bad", SubmitBehavior::PoolFailure("exit 2".into()));
        transport.set_submit("down", SubmitBehavior::NetworkError("refused".into()));
        transport.set_submit("slow", delayed_complete(5_000, json!("late")));

        let task = TaskBuilder::new().with_timeout_seconds(1).build();
        let outcome = distributor
            .distribute_task(task, targets, AggregationStrategy::AllSuccess)
            .await
            .unwrap();

        let statuses: Vec<TaskStatus> = outcome.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                TaskStatus::Completed,
                TaskStatus::Failed,
                TaskStatus::Failed,
                TaskStatus::Timeout
            ]
        );
        assert_eq!(outcome.results[1].error.as_deref(), Some("exit 2"));
        assert!(outcome.results.iter().all(|r| r.is_terminal()));
        assert_eq!(outcome.completed_count(), 1);
    }

    #[tokio::test]
    async fn test_parallelism_bound_and_fifo_admission() {
        let targets = pools(&["p0", "p1", "p2", "p3", "p4", "p5"]);
        let (distributor, transport, _) = setup(&targets, 2).await;
        for target in &targets {
            transport.set_submit(&target.name, delayed_complete(40, json!(target.name)));
        }

        let outcome = distributor
            .distribute_task(TaskBuilder::new().build(), targets.clone(), AggregationStrategy::AllSuccess)
            .await
            .unwrap();

        assert_eq!(outcome.results.len(), 6);
        assert_eq!(transport.max_in_flight(), 2);
        // 前两个同时开始，其余按输入顺序排队
        let started = transport.submitted_pools();
        assert_eq!(&started[2..], &["p2", "p3", "p4", "p5"]);
    }

    #[tokio::test]
    async fn test_zero_parallelism_runs_one_at_a_time() {
        let targets = pools(&["p0", "p1"]);
        let (distributor, transport, _) = setup(&targets, 0).await;
        for target in &targets {
            transport.set_submit(&target.name, delayed_complete(20, json!(target.name)));
        }
        let task = TaskBuilder::new().with_timeout_seconds(1).build();

        let outcome = tokio::time::timeout(
            Duration::from_secs(3),
            distributor.distribute_task(task, targets, AggregationStrategy::AllSuccess),
        )
        .await
        .expect("分发不应挂起")
        .unwrap();

        assert_eq!(outcome.completed_count(), 2);
        assert_eq!(transport.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_first_success_does_not_wait_for_pending() {
        let targets = pools(&["P1", "P2", "P3"]);
        let (distributor, transport, _) = setup(&targets, 10).await;
        transport.set_submit("P1", SubmitBehavior::Hang);
        transport.set_submit("P2", delayed_complete(20, json!("fast")));
        transport.set_submit("P3", SubmitBehavior::Hang);

        let start = Instant::now();
        let outcome = distributor
            .distribute_task(TaskBuilder::new().build(), targets, AggregationStrategy::FirstSuccess)
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_secs(2));
        let winner = outcome.winner.expect("winner");
        assert_eq!(winner.pool_name, "P2");
        assert_eq!(winner.output, Some(json!("fast")));

        let statuses: Vec<TaskStatus> = outcome.results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![TaskStatus::Running, TaskStatus::Completed, TaskStatus::Running]
        );
        // 未取消仍在运行的提交
        assert!(transport.cancels().is_empty());
    }

    #[tokio::test]
    async fn test_first_success_leaves_queued_pools_unstarted() {
        let targets = pools(&["a", "b", "c"]);
        let (distributor, transport, _) = setup(&targets, 1).await;
        transport.set_submit("a", delayed_complete(10, json!("a")));
        // b 可能在 a 释放并发额度后开始，但会一直占用额度
        transport.set_submit("b", SubmitBehavior::Hang);
        transport.set_submit("c", SubmitBehavior::Hang);

        let outcome = distributor
            .distribute_task(TaskBuilder::new().build(), targets, AggregationStrategy::FirstSuccess)
            .await
            .unwrap();

        assert_eq!(outcome.winner.unwrap().pool_name, "a");
        assert_eq!(outcome.results[0].status, TaskStatus::Completed);
        assert_eq!(outcome.results[2].status, TaskStatus::Pending);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!transport.submitted_pools().contains(&"c".to_string()));
    }

    #[tokio::test]
    async fn test_first_success_without_completion_waits_for_all() {
        let targets = pools(&["x", "y"]);
        let (distributor, transport, _) = setup(&targets, 10).await;
        transport.set_submit("x", SubmitBehavior::PoolFailure("no".into()));
        transport.set_submit("y", SubmitBehavior::NetworkError("no".into()));

        let outcome = distributor
            .distribute_task(TaskBuilder::new().build(), targets, AggregationStrategy::FirstSuccess)
            .await
            .unwrap();
        assert!(outcome.winner.is_none());
        assert!(outcome.results.iter().all(|r| r.status == TaskStatus::Failed));
    }

    #[tokio::test]
    async fn test_majority_resolves_after_more_than_half() {
        let targets = pools(&["m1", "m2", "m3"]);
        let (distributor, transport, _) = setup(&targets, 10).await;
        transport.set_submit("m1", delayed_complete(10, json!({"answer": 42})));
        transport.set_submit("m2", delayed_complete(30, json!({"answer": 42})));
        transport.set_submit("m3", SubmitBehavior::Hang);

        let outcome = distributor
            .distribute_task(TaskBuilder::new().build(), targets, AggregationStrategy::Majority)
            .await
            .unwrap();

        assert_eq!(outcome.majority_output, Some(json!({"answer": 42})));
        assert_eq!(outcome.winner.unwrap().pool_name, "m1");
        assert_eq!(outcome.results[2].status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_broadcast_targets_active_pools_only() {
        let targets = vec![
            PoolDescriptorBuilder::new("a").build(),
            PoolDescriptorBuilder::new("b").build(),
            PoolDescriptorBuilder::new("full").with_workers(10, 10).build(),
            PoolDescriptorBuilder::new("down").build(),
        ];
        let (distributor, transport, registry) = setup(&targets, 10).await;
        registry
            .set_health_status("down", HealthStatus::Unavailable)
            .await
            .unwrap();

        let outcome = distributor
            .broadcast_task(TaskBuilder::new().build(), AggregationStrategy::AllSuccess)
            .await
            .unwrap();

        let names: Vec<&String> = outcome.results.keys().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert!(outcome.results.values().all(|r| r.status == TaskStatus::Completed));
        assert_eq!(transport.submissions().len(), 2);
    }

    #[tokio::test]
    async fn test_broadcast_first_success() {
        let targets = pools(&["P1", "P2", "P3"]);
        let (distributor, transport, _) = setup(&targets, 10).await;
        transport.set_submit("P1", SubmitBehavior::Hang);
        transport.set_submit("P2", delayed_complete(5, json!("p2")));
        transport.set_submit("P3", SubmitBehavior::Hang);

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            distributor.broadcast_task(TaskBuilder::new().build(), AggregationStrategy::FirstSuccess),
        )
        .await
        .expect("broadcast blocked on pending pools")
        .unwrap();

        assert_eq!(outcome.winner.unwrap().pool_name, "P2");
        assert_eq!(outcome.results["P2"].status, TaskStatus::Completed);
        assert_eq!(outcome.results["P1"].status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_distribute_to_named_requires_registered_pools() {
        let targets = pools(&["a"]);
        let (distributor, _, _) = setup(&targets, 10).await;

        let err = distributor
            .distribute_to_named(
                TaskBuilder::new().build(),
                &["a".to_string(), "ghost".to_string()],
                AggregationStrategy::AllSuccess,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, FleetError::PoolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_pool_list() {
        let (distributor, _, _) = setup(&[], 10).await;
        let outcome = distributor
            .distribute_task(TaskBuilder::new().build(), vec![], AggregationStrategy::Majority)
            .await
            .unwrap();
        assert!(outcome.results.is_empty());
        assert!(outcome.winner.is_none());
    }
}

//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use std::collections::BTreeSet;

use fleet_core::models::{
    DistributedTask, HealthStatus, PoolDescriptor, PoolType, RoutingStrategy,
};

/// Builder for creating test PoolDescriptor entities
pub struct PoolDescriptorBuilder {
    pool: PoolDescriptor,
}

impl PoolDescriptorBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            pool: PoolDescriptor::new(
                name,
                PoolType::LocalProcess,
                format!("http://{name}.pools.test"),
                10,
            ),
        }
    }

    pub fn with_pool_type(mut self, pool_type: PoolType) -> Self {
        self.pool.pool_type = pool_type;
        self
    }

    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.pool.endpoint = endpoint.to_string();
        self
    }

    pub fn with_capabilities(mut self, capabilities: Vec<&str>) -> Self {
        self.pool.capabilities = capabilities.into_iter().map(String::from).collect();
        self
    }

    /// 设置 current/max 工作者数
    pub fn with_workers(mut self, current: u32, max: u32) -> Self {
        self.pool.current_workers = current;
        self.pool.max_workers = max;
        self
    }

    pub fn with_queue_size(mut self, queue_size: u32) -> Self {
        self.pool.queue_size = queue_size;
        self
    }

    pub fn with_health_status(mut self, status: HealthStatus) -> Self {
        self.pool.health_status = status;
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.pool.region = Some(region.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: serde_json::Value) -> Self {
        self.pool.metadata.insert(key.to_string(), value);
        self
    }

    pub fn build(self) -> PoolDescriptor {
        self.pool
    }
}

/// Builder for creating test DistributedTask entities
pub struct TaskBuilder {
    task: DistributedTask,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: DistributedTask::new("test_task", serde_json::json!({"input": 1})),
        }
    }

    pub fn with_id(mut self, task_id: &str) -> Self {
        self.task.task_id = task_id.to_string();
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.task.payload = payload;
        self
    }

    pub fn with_required_capabilities(mut self, capabilities: Vec<&str>) -> Self {
        self.task.required_capabilities = capabilities
            .into_iter()
            .map(String::from)
            .collect::<BTreeSet<_>>();
        self
    }

    pub fn with_strategy(mut self, strategy: RoutingStrategy) -> Self {
        self.task.routing_strategy = strategy;
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.task.timeout_seconds = timeout_seconds;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn with_region(mut self, region: &str) -> Self {
        self.task = self.task.with_region(region);
        self
    }

    pub fn build(self) -> DistributedTask {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

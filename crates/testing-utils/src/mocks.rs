//! Mock implementations of the transport, discovery and alerting traits
//!
//! Behaviour is scripted per pool name; pools without a script complete
//! immediately and report healthy with zero load.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fleet_core::models::{
    CancelAck, DistributedTask, HealthStatus, HealthTransitionEvent, PoolDescriptor,
    PoolHealthReport, PoolSubmitResponse,
};
use fleet_core::traits::{AlertSink, DiscoveryClient, PoolTransport};
use fleet_core::{FleetError, FleetResult};

/// Scripted response to `submit`
#[derive(Debug, Clone)]
pub enum SubmitBehavior {
    /// Pool reports COMPLETED with this output
    Complete(serde_json::Value),
    /// Pool reports FAILED with this error
    PoolFailure(String),
    /// Transport-level error
    NetworkError(String),
    /// Wait, then behave as the inner script
    Delay(Duration, Box<SubmitBehavior>),
    /// Never respond
    Hang,
}

impl SubmitBehavior {
    pub fn delayed(delay: Duration, inner: SubmitBehavior) -> Self {
        SubmitBehavior::Delay(delay, Box::new(inner))
    }
}

/// Scripted response to `health`
#[derive(Debug, Clone)]
pub enum HealthBehavior {
    Report(PoolHealthReport),
    Fail(String),
    Delay(Duration, Box<HealthBehavior>),
}

impl HealthBehavior {
    pub fn healthy(current_workers: u32, queue_size: u32) -> Self {
        HealthBehavior::Report(PoolHealthReport {
            status: HealthStatus::Healthy,
            current_workers,
            queue_size,
        })
    }
}

/// Mock implementation of PoolTransport for testing
#[derive(Debug, Default)]
pub struct MockPoolTransport {
    submit_behaviors: Mutex<HashMap<String, SubmitBehavior>>,
    health_behaviors: Mutex<HashMap<String, HealthBehavior>>,
    unreachable_for_cancel: Mutex<HashSet<String>>,
    cancel_acks: Mutex<HashMap<String, CancelAck>>,
    submissions: Mutex<Vec<(String, String)>>,
    cancels: Mutex<Vec<(String, String)>>,
    probes: Mutex<HashMap<String, usize>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockPoolTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn set_submit(&self, pool: &str, behavior: SubmitBehavior) {
        self.submit_behaviors
            .lock()
            .unwrap()
            .insert(pool.to_string(), behavior);
    }

    pub fn set_health(&self, pool: &str, behavior: HealthBehavior) {
        self.health_behaviors
            .lock()
            .unwrap()
            .insert(pool.to_string(), behavior);
    }

    /// Make `cancel` fail with a network error for this pool
    pub fn set_cancel_unreachable(&self, pool: &str) {
        self.unreachable_for_cancel
            .lock()
            .unwrap()
            .insert(pool.to_string());
    }

    /// Script the acknowledgement returned by `cancel` for this pool
    pub fn set_cancel_ack(&self, pool: &str, acknowledged: bool, message: Option<&str>) {
        self.cancel_acks.lock().unwrap().insert(
            pool.to_string(),
            CancelAck {
                acknowledged,
                message: message.map(String::from),
            },
        );
    }

    /// (pool, task_id) in the order submissions started
    pub fn submissions(&self) -> Vec<(String, String)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submitted_pools(&self) -> Vec<String> {
        self.submissions()
            .into_iter()
            .map(|(pool, _)| pool)
            .collect()
    }

    pub fn cancels(&self) -> Vec<(String, String)> {
        self.cancels.lock().unwrap().clone()
    }

    pub fn probe_count(&self, pool: &str) -> usize {
        self.probes.lock().unwrap().get(pool).copied().unwrap_or(0)
    }

    /// Highest number of submissions observed running at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    async fn run_submit(
        behavior: SubmitBehavior,
        pool: &PoolDescriptor,
    ) -> FleetResult<PoolSubmitResponse> {
        let mut behavior = behavior;
        loop {
            match behavior {
                SubmitBehavior::Complete(output) => return Ok(PoolSubmitResponse::completed(output)),
                SubmitBehavior::PoolFailure(error) => return Ok(PoolSubmitResponse::failed(error)),
                SubmitBehavior::NetworkError(error) => {
                    return Err(FleetError::Network(format!("{}: {error}", pool.name)))
                }
                SubmitBehavior::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    behavior = *inner;
                }
                SubmitBehavior::Hang => std::future::pending::<()>().await,
            }
        }
    }
}

/// Decrements the in-flight counter even when the submit future is dropped
struct InFlightGuard<'a>(&'a MockPoolTransport);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.leave();
    }
}

#[async_trait]
impl PoolTransport for MockPoolTransport {
    async fn submit(
        &self,
        pool: &PoolDescriptor,
        task: &DistributedTask,
    ) -> FleetResult<PoolSubmitResponse> {
        self.submissions
            .lock()
            .unwrap()
            .push((pool.name.clone(), task.task_id.clone()));

        let behavior = self
            .submit_behaviors
            .lock()
            .unwrap()
            .get(&pool.name)
            .cloned()
            .unwrap_or_else(|| SubmitBehavior::Complete(serde_json::json!({ "pool": pool.name })));

        self.enter();
        let _guard = InFlightGuard(self);
        Self::run_submit(behavior, pool).await
    }

    async fn health(&self, pool: &PoolDescriptor) -> FleetResult<PoolHealthReport> {
        *self
            .probes
            .lock()
            .unwrap()
            .entry(pool.name.clone())
            .or_insert(0) += 1;

        let mut behavior = self
            .health_behaviors
            .lock()
            .unwrap()
            .get(&pool.name)
            .cloned()
            .unwrap_or_else(|| HealthBehavior::healthy(0, 0));

        loop {
            match behavior {
                HealthBehavior::Report(report) => return Ok(report),
                HealthBehavior::Fail(error) => {
                    return Err(FleetError::Network(format!("{}: {error}", pool.name)))
                }
                HealthBehavior::Delay(delay, inner) => {
                    tokio::time::sleep(delay).await;
                    behavior = *inner;
                }
            }
        }
    }

    async fn cancel(&self, pool: &PoolDescriptor, task_id: &str) -> FleetResult<CancelAck> {
        if self.unreachable_for_cancel.lock().unwrap().contains(&pool.name) {
            return Err(FleetError::Network(format!("{} 无法连接", pool.name)));
        }
        self.cancels
            .lock()
            .unwrap()
            .push((pool.name.clone(), task_id.to_string()));
        let scripted = self.cancel_acks.lock().unwrap().get(&pool.name).cloned();
        Ok(scripted.unwrap_or(CancelAck {
            acknowledged: true,
            message: None,
        }))
    }
}

/// Mock implementation of DiscoveryClient for testing
#[derive(Debug, Default)]
pub struct MockDiscoveryClient {
    responses: Mutex<HashMap<String, Result<Vec<PoolDescriptor>, String>>>,
    calls: Mutex<Vec<String>>,
}

impl MockDiscoveryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pools(&self, endpoint: &str, pools: Vec<PoolDescriptor>) {
        self.responses
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Ok(pools));
    }

    pub fn set_error(&self, endpoint: &str, error: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), Err(error.to_string()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiscoveryClient for MockDiscoveryClient {
    async fn discover(&self, endpoint: &str) -> FleetResult<Vec<PoolDescriptor>> {
        self.calls.lock().unwrap().push(endpoint.to_string());
        match self.responses.lock().unwrap().get(endpoint) {
            Some(Ok(pools)) => Ok(pools.clone()),
            Some(Err(error)) => Err(FleetError::Network(error.clone())),
            None => Ok(Vec::new()),
        }
    }
}

/// Alert sink that records every event
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    events: Mutex<Vec<HealthTransitionEvent>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HealthTransitionEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn events_for(&self, pool: &str) -> Vec<HealthTransitionEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.pool_name == pool)
            .collect()
    }
}

impl AlertSink for RecordingAlertSink {
    fn send(&self, event: HealthTransitionEvent) {
        self.events.lock().unwrap().push(event);
    }
}

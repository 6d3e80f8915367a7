use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use fleet_core::config::RegistrySettings;
use fleet_core::models::{HealthCheckRecord, HealthStatus, PoolDescriptor, PoolStatus};
use fleet_core::traits::DiscoveryClient;
use fleet_core::{FleetError, FleetResult};

/// 工作池的来源，决定是否参与自动清除
#[derive(Debug, Clone, PartialEq, Eq)]
enum PoolOrigin {
    Explicit,
    Discovered { endpoint: String },
}

#[derive(Debug, Clone)]
struct PoolEntry {
    descriptor: PoolDescriptor,
    last_check: Option<HealthCheckRecord>,
    origin: PoolOrigin,
    missed_sweeps: u32,
    /// 注册代次，注销后重新注册的同名工作池拿到新的代次
    generation: u64,
}

impl PoolEntry {
    fn new(descriptor: PoolDescriptor, origin: PoolOrigin, generation: u64) -> Self {
        Self {
            descriptor,
            last_check: None,
            origin,
            missed_sweeps: 0,
            generation,
        }
    }
}

/// `update_pool` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// 一次发现轮次的汇总
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySummary {
    pub endpoints_queried: usize,
    /// (端点, 错误信息)
    pub failed_endpoints: Vec<(String, String)>,
    pub inserted: Vec<String>,
    pub updated: Vec<String>,
    pub unchanged: usize,
    /// 描述校验失败而被忽略的工作池
    pub rejected: Vec<String>,
    pub purged: Vec<String>,
}

/// 注册表统计
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistryStats {
    pub total_pools: usize,
    pub active_pools: usize,
    pub by_pool_type: BTreeMap<String, usize>,
    pub by_capability: BTreeMap<String, usize>,
    pub by_health_status: BTreeMap<String, usize>,
    pub by_region: BTreeMap<String, usize>,
    pub total_max_workers: u64,
    pub total_current_workers: u64,
}

/// 工作池注册表
///
/// 以名称为键持有全部工作池描述及其最近一次健康探测。写操作（注册、更新、注销、
/// 健康状态写回）互斥，读操作并发进行并拿到单个描述的一致快照。
pub struct PoolRegistry {
    pools: RwLock<HashMap<String, PoolEntry>>,
    settings: RegistrySettings,
    discovery: Option<Arc<dyn DiscoveryClient>>,
    next_generation: AtomicU64,
}

impl Default for PoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::with_settings(RegistrySettings::default())
    }

    pub fn with_settings(settings: RegistrySettings) -> Self {
        Self {
            pools: RwLock::new(HashMap::new()),
            settings,
            discovery: None,
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn with_discovery_client(mut self, client: Arc<dyn DiscoveryClient>) -> Self {
        self.discovery = Some(client);
        self
    }

    /// 注册新的工作池，名称已存在时失败
    pub async fn register_pool(&self, descriptor: PoolDescriptor) -> FleetResult<()> {
        descriptor.validate()?;

        let mut pools = self.pools.write().await;
        if pools.contains_key(&descriptor.name) {
            return Err(FleetError::DuplicatePool {
                name: descriptor.name,
            });
        }

        info!(
            pool = %descriptor.name,
            pool_type = %descriptor.pool_type,
            max_workers = descriptor.max_workers,
            "注册工作池"
        );
        let generation = self.allocate_generation();
        pools.insert(
            descriptor.name.clone(),
            PoolEntry::new(descriptor, PoolOrigin::Explicit, generation),
        );
        Ok(())
    }

    /// 按名称幂等更新或插入
    ///
    /// 已存在时只刷新静态字段，健康状态与容量仍由健康监控器维护。
    pub async fn update_pool(&self, descriptor: PoolDescriptor) -> FleetResult<UpsertOutcome> {
        self.upsert(descriptor, PoolOrigin::Explicit).await
    }

    async fn upsert(
        &self,
        descriptor: PoolDescriptor,
        origin: PoolOrigin,
    ) -> FleetResult<UpsertOutcome> {
        descriptor.validate()?;

        let mut pools = self.pools.write().await;
        match pools.get_mut(&descriptor.name) {
            Some(entry) => {
                let mut refreshed = entry.descriptor.clone();
                refreshed.refresh_static_fields(descriptor);
                match origin {
                    PoolOrigin::Discovered { .. } => entry.missed_sweeps = 0,
                    PoolOrigin::Explicit if entry.origin != PoolOrigin::Explicit => {
                        debug!(pool = %refreshed.name, "显式更新接管发现的工作池，不再参与自动清除");
                        entry.origin = PoolOrigin::Explicit;
                        entry.missed_sweeps = 0;
                    }
                    PoolOrigin::Explicit => {}
                }
                if refreshed == entry.descriptor {
                    Ok(UpsertOutcome::Unchanged)
                } else {
                    debug!(pool = %refreshed.name, "刷新工作池描述");
                    entry.descriptor = refreshed;
                    Ok(UpsertOutcome::Updated)
                }
            }
            None => {
                info!(pool = %descriptor.name, "新增工作池");
                let generation = self.allocate_generation();
                pools.insert(
                    descriptor.name.clone(),
                    PoolEntry::new(descriptor, origin, generation),
                );
                Ok(UpsertOutcome::Inserted)
            }
        }
    }

    fn allocate_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }

    /// 工作池当前的注册代次，未注册时为 `None`
    pub async fn pool_generation(&self, name: &str) -> Option<u64> {
        self.pools.read().await.get(name).map(|entry| entry.generation)
    }

    /// 全部工作池的注册代次
    pub async fn pool_generations(&self) -> HashMap<String, u64> {
        self.pools
            .read()
            .await
            .iter()
            .map(|(name, entry)| (name.clone(), entry.generation))
            .collect()
    }

    /// 注销工作池
    pub async fn deregister_pool(&self, name: &str) -> FleetResult<PoolDescriptor> {
        let mut pools = self.pools.write().await;
        match pools.remove(name) {
            Some(entry) => {
                info!(pool = %name, "注销工作池");
                Ok(entry.descriptor)
            }
            None => Err(FleetError::pool_not_found(name)),
        }
    }

    /// 查询发现端点并按名称幂等合并
    ///
    /// 本轮缺席的工作池不会被移除，交由健康监控器在探测失败后标记为 UNAVAILABLE；
    /// 只有配置了 `purge_after_missed_sweeps` 时，经发现加入、已不可用且连续缺席达到阈值的
    /// 工作池才会被清除。
    pub async fn discover_pools(&self, endpoints: &[String]) -> FleetResult<DiscoverySummary> {
        let client = self.discovery.as_ref().ok_or_else(|| {
            FleetError::Configuration("注册表未配置发现客户端".to_string())
        })?;

        let mut summary = DiscoverySummary {
            endpoints_queried: endpoints.len(),
            ..Default::default()
        };
        let mut seen: HashSet<String> = HashSet::new();
        let mut reachable_endpoints: HashSet<&str> = HashSet::new();

        for endpoint in endpoints {
            let descriptors = match client.discover(endpoint).await {
                Ok(descriptors) => descriptors,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "发现端点查询失败");
                    summary.failed_endpoints.push((endpoint.clone(), e.to_string()));
                    continue;
                }
            };
            reachable_endpoints.insert(endpoint.as_str());
            debug!(endpoint = %endpoint, count = descriptors.len(), "发现端点返回工作池");

            for descriptor in descriptors {
                let name = descriptor.name.clone();
                let origin = PoolOrigin::Discovered {
                    endpoint: endpoint.clone(),
                };
                match self.upsert(descriptor, origin).await {
                    Ok(UpsertOutcome::Inserted) => summary.inserted.push(name.clone()),
                    Ok(UpsertOutcome::Updated) => summary.updated.push(name.clone()),
                    Ok(UpsertOutcome::Unchanged) => summary.unchanged += 1,
                    Err(e) => {
                        warn!(pool = %name, error = %e, "忽略无效的发现结果");
                        summary.rejected.push(name.clone());
                        continue;
                    }
                }
                seen.insert(name);
            }
        }

        summary.purged = self.age_discovered_pools(&seen, &reachable_endpoints).await;

        info!(
            endpoints = summary.endpoints_queried,
            failed = summary.failed_endpoints.len(),
            inserted = summary.inserted.len(),
            updated = summary.updated.len(),
            purged = summary.purged.len(),
            "发现轮次完成"
        );
        Ok(summary)
    }

    /// 更新缺席计数并按策略清除
    async fn age_discovered_pools(
        &self,
        seen: &HashSet<String>,
        reachable_endpoints: &HashSet<&str>,
    ) -> Vec<String> {
        let mut pools = self.pools.write().await;
        let mut purged = Vec::new();

        for (name, entry) in pools.iter_mut() {
            let PoolOrigin::Discovered { endpoint } = &entry.origin else {
                continue;
            };
            if seen.contains(name) || !reachable_endpoints.contains(endpoint.as_str()) {
                continue;
            }
            entry.missed_sweeps = entry.missed_sweeps.saturating_add(1);

            if let Some(limit) = self.settings.purge_after_missed_sweeps {
                if entry.missed_sweeps >= limit
                    && entry.descriptor.health_status == HealthStatus::Unavailable
                {
                    purged.push(name.clone());
                }
            }
        }

        for name in &purged {
            pools.remove(name);
            warn!(pool = %name, "工作池连续缺席且不可用，已清除");
        }
        purged.sort();
        purged
    }

    /// 所有工作池的快照，按名称排序
    pub async fn get_all_pools(&self) -> Vec<PoolDescriptor> {
        let pools = self.pools.read().await;
        let mut all: Vec<PoolDescriptor> = pools.values().map(|e| e.descriptor.clone()).collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// 当前可用（未 UNAVAILABLE 且有空闲工作者）的工作池
    pub async fn get_active_pools(&self) -> Vec<PoolDescriptor> {
        self.get_all_pools()
            .await
            .into_iter()
            .filter(|p| p.is_available())
            .collect()
    }

    pub async fn find_pools_by_capability(&self, capability: &str) -> Vec<PoolDescriptor> {
        self.get_all_pools()
            .await
            .into_iter()
            .filter(|p| p.capabilities.contains(capability))
            .collect()
    }

    pub async fn find_pools_by_region(&self, region: &str) -> Vec<PoolDescriptor> {
        self.get_all_pools()
            .await
            .into_iter()
            .filter(|p| p.region.as_deref() == Some(region))
            .collect()
    }

    pub async fn get_pool(&self, name: &str) -> FleetResult<PoolDescriptor> {
        self.pools
            .read()
            .await
            .get(name)
            .map(|e| e.descriptor.clone())
            .ok_or_else(|| FleetError::pool_not_found(name))
    }

    /// 描述与最近一次健康探测
    pub async fn get_pool_status(&self, name: &str) -> FleetResult<PoolStatus> {
        let pools = self.pools.read().await;
        let entry = pools
            .get(name)
            .ok_or_else(|| FleetError::pool_not_found(name))?;
        Ok(PoolStatus {
            descriptor: entry.descriptor.clone(),
            last_check: entry.last_check.clone(),
        })
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.pools.read().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.pools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pools.read().await.is_empty()
    }

    /// 写回一次探测的结果，返回写入前的健康状态
    ///
    /// 状态、容量与最近记录在同一把写锁内更新，读者不会看到半更新的描述。
    pub async fn apply_health_check(
        &self,
        record: HealthCheckRecord,
        capacity: Option<(u32, u32)>,
    ) -> FleetResult<HealthStatus> {
        let mut pools = self.pools.write().await;
        let entry = pools
            .get_mut(&record.pool_name)
            .ok_or_else(|| FleetError::pool_not_found(&record.pool_name))?;

        let old_status = entry.descriptor.health_status;
        let (current_workers, queue_size) = capacity.unwrap_or((
            entry.descriptor.current_workers,
            entry.descriptor.queue_size,
        ));
        entry
            .descriptor
            .apply_health(record.status, current_workers, queue_size);
        entry.last_check = Some(record);
        Ok(old_status)
    }

    /// 仅修改健康状态，返回写入前的状态
    pub async fn set_health_status(
        &self,
        name: &str,
        status: HealthStatus,
    ) -> FleetResult<HealthStatus> {
        let mut pools = self.pools.write().await;
        let entry = pools
            .get_mut(name)
            .ok_or_else(|| FleetError::pool_not_found(name))?;
        let old_status = entry.descriptor.health_status;
        entry.descriptor.health_status = status;
        Ok(old_status)
    }

    pub async fn get_registry_stats(&self) -> RegistryStats {
        let all = self.get_all_pools().await;
        let mut stats = RegistryStats {
            total_pools: all.len(),
            ..Default::default()
        };

        for pool in &all {
            if pool.is_available() {
                stats.active_pools += 1;
            }
            *stats
                .by_pool_type
                .entry(pool.pool_type.to_string())
                .or_insert(0) += 1;
            *stats
                .by_health_status
                .entry(pool.health_status.to_string())
                .or_insert(0) += 1;
            for capability in &pool.capabilities {
                *stats.by_capability.entry(capability.clone()).or_insert(0) += 1;
            }
            if let Some(region) = &pool.region {
                *stats.by_region.entry(region.clone()).or_insert(0) += 1;
            }
            stats.total_max_workers += pool.max_workers as u64;
            stats.total_current_workers += pool.current_workers as u64;
        }

        stats
    }
}

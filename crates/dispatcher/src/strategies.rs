use std::cmp::Ordering as CmpOrdering;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use fleet_core::models::{DistributedTask, PoolDescriptor, RoutingStrategy};

/// 负载比较的全序：负载率、积压数、名称
pub fn compare_load(a: &PoolDescriptor, b: &PoolDescriptor) -> CmpOrdering {
    a.load_factor()
        .total_cmp(&b.load_factor())
        .then_with(|| a.queue_size.cmp(&b.queue_size))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn least_loaded<'a, I>(pools: I) -> Option<&'a PoolDescriptor>
where
    I: IntoIterator<Item = &'a PoolDescriptor>,
{
    pools.into_iter().min_by(|a, b| compare_load(a, b))
}

fn round_robin(pools: &[PoolDescriptor], tick: usize) -> Option<&PoolDescriptor> {
    let mut sorted: Vec<&PoolDescriptor> = pools.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));

    let index = tick % sorted.len();
    let selected = sorted[index];
    debug!(
        "轮询策略选择工作池: {} (索引: {}/{})",
        selected.name,
        index,
        sorted.len()
    );
    Some(selected)
}

fn capability_based<'a>(
    pools: &'a [PoolDescriptor],
    required: &BTreeSet<String>,
) -> Option<&'a PoolDescriptor> {
    let best = pools
        .iter()
        .map(|p| p.capability_overlap(required))
        .max()?;
    least_loaded(pools.iter().filter(|p| p.capability_overlap(required) == best))
}

fn region_aware<'a>(pools: &'a [PoolDescriptor], region: Option<&str>) -> Option<&'a PoolDescriptor> {
    if let Some(region) = region {
        let local = least_loaded(pools.iter().filter(|p| p.region.as_deref() == Some(region)));
        if local.is_some() {
            return local;
        }
        debug!("区域 {} 没有可用工作池，回退到最小负载", region);
    }
    least_loaded(pools)
}

fn affinity<'a>(pools: &'a [PoolDescriptor], preferred: Option<&str>) -> Option<&'a PoolDescriptor> {
    if let Some(name) = preferred {
        if let Some(pool) = pools.iter().find(|p| p.name == name) {
            return Some(pool);
        }
        debug!("亲和工作池 {} 不在候选集中，回退到最小负载", name);
    }
    least_loaded(pools)
}

/// 路由选择器
///
/// 持有执行器级别的轮询计数器。计数器在每次调用 `select` 后递增，与所用策略无关。
#[derive(Debug, Default)]
pub struct PoolSelector {
    counter: AtomicUsize,
}

impl PoolSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从候选集中选择一个工作池
    ///
    /// `affinity_pool` 为该任务类型最近一次成功完成的工作池，只有 AFFINITY 策略使用。
    pub fn select<'a>(
        &self,
        strategy: RoutingStrategy,
        task: &DistributedTask,
        candidates: &'a [PoolDescriptor],
        affinity_pool: Option<&str>,
    ) -> Option<&'a PoolDescriptor> {
        let tick = self.counter.fetch_add(1, Ordering::Relaxed);
        if candidates.is_empty() {
            debug!("没有可用的工作池");
            return None;
        }

        let selected = match strategy {
            RoutingStrategy::LeastLoaded => least_loaded(candidates),
            RoutingStrategy::RoundRobin => round_robin(candidates, tick),
            RoutingStrategy::CapabilityBased => {
                capability_based(candidates, &task.required_capabilities)
            }
            RoutingStrategy::RegionAware => region_aware(candidates, task.region_hint()),
            RoutingStrategy::Affinity => affinity(candidates, affinity_pool),
        };

        if let Some(pool) = selected {
            debug!(
                task_id = %task.task_id,
                strategy = %strategy,
                pool = %pool.name,
                load = pool.load_factor(),
                "路由选择完成"
            );
        }
        selected
    }

    /// 已进行的选择次数
    pub fn round_robin_counter(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}

//! 负载均衡模块
//!
//! 从调用方提供的健康实例列表中为每次尝试选出一个实例，
//! 支持轮询、加权、最少连接和随机策略，以及可选的会话保持。

mod session;

pub use session::{
    DEFAULT_SESSION_CAPACITY, DEFAULT_SESSION_TTL, SessionLimits, session_key_from_request,
};

use session::SessionTable;

use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, trace};

use crate::registry::{ConnectionCounter, LoadBalancingAlgorithm, LoadBalancingConfig, ServiceInstance};

/// 单个实例的选择统计
#[derive(Debug, Clone)]
struct InstanceSelection {
    url: String,
    weight: u32,
    selections: u64,
    connections: ConnectionCounter,
}

#[derive(Debug, Default)]
struct ServiceSelection {
    total: u64,
    instances: HashMap<String, InstanceSelection>,
}

/// 实例分布快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDistribution {
    pub instance_id: String,
    pub url: String,
    pub weight: u32,
    pub selections: u64,
    pub current_connections: usize,
}

/// 单个服务的分布快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDistribution {
    pub service_id: String,
    pub total_selections: u64,
    pub sticky_sessions: usize,
    pub instances: Vec<InstanceDistribution>,
}

/// 负载均衡统计
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalancerStats {
    pub services: Vec<ServiceDistribution>,
}

impl BalancerStats {
    pub fn service(&self, service_id: &str) -> Option<&ServiceDistribution> {
        self.services.iter().find(|s| s.service_id == service_id)
    }
}

/// 一次在途连接的占用，释放（drop）时计数减一
#[must_use = "dropping the reservation releases the connection immediately"]
#[derive(Debug)]
pub struct ConnectionReservation {
    instance_id: String,
    counter: ConnectionCounter,
}

impl ConnectionReservation {
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

impl Drop for ConnectionReservation {
    fn drop(&mut self) {
        self.counter.decrement();
    }
}

/// 负载均衡器
///
/// 每个服务各自维护轮询游标和会话映射。
#[derive(Default)]
pub struct LoadBalancer {
    cursors: RwLock<HashMap<String, Arc<AtomicUsize>>>,
    sessions: RwLock<HashMap<String, SessionTable>>,
    session_limits: SessionLimits,
    stats: RwLock<HashMap<String, ServiceSelection>>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 指定每个服务会话绑定表的容量和空闲过期时间
    pub fn with_session_limits(limits: SessionLimits) -> Self {
        Self {
            session_limits: limits,
            ..Self::default()
        }
    }

    /// 选择服务实例
    ///
    /// 候选列表为空时返回 `None`，调用方视为“无可用实例”。
    pub async fn select_instance(
        &self,
        service_id: &str,
        config: &LoadBalancingConfig,
        instances: &[ServiceInstance],
    ) -> Option<ServiceInstance> {
        if instances.is_empty() {
            return None;
        }

        let index = match config.algorithm {
            LoadBalancingAlgorithm::RoundRobin => self.next_round_robin(service_id, instances.len()).await,
            LoadBalancingAlgorithm::Weighted => match weighted_index(instances) {
                Some(index) => index,
                None => self.next_round_robin(service_id, instances.len()).await,
            },
            LoadBalancingAlgorithm::LeastConnections => least_connections_index(instances),
            LoadBalancingAlgorithm::Random => random_index(instances.len()),
        };

        let selected = instances.get(index)?.clone();
        trace!(
            service_id = %service_id,
            instance_id = %selected.id,
            algorithm = ?config.algorithm,
            "Instance selected"
        );
        self.record_selection(service_id, &selected).await;
        Some(selected)
    }

    /// 带会话保持的实例选择
    ///
    /// 会话已绑定的实例未过期、仍在候选列表中且健康时直接返回，
    /// 否则按配置的算法重新选择并记录新的绑定。
    pub async fn select_instance_with_sticky_session(
        &self,
        service_id: &str,
        config: &LoadBalancingConfig,
        instances: &[ServiceInstance],
        session_key: Option<&str>,
    ) -> Option<ServiceInstance> {
        let key = match session_key {
            Some(key) if config.sticky_sessions && !key.is_empty() => key,
            _ => return self.select_instance(service_id, config, instances).await,
        };

        let bound = {
            let mut sessions = self.sessions.write().await;
            sessions
                .get_mut(service_id)
                .and_then(|table| table.touch(key, self.session_limits.ttl))
                .and_then(|id| instances.iter().find(|i| i.id == id && i.is_healthy))
                .cloned()
        };
        if let Some(instance) = bound {
            self.record_selection(service_id, &instance).await;
            return Some(instance);
        }

        let selected = self.select_instance(service_id, config, instances).await?;
        let evicted = self
            .sessions
            .write()
            .await
            .entry(service_id.to_string())
            .or_default()
            .bind(key, &selected.id, &self.session_limits, |id| {
                instances.iter().any(|i| i.id == id)
            });
        debug!(
            service_id = %service_id,
            instance_id = %selected.id,
            evicted,
            "Session bound to instance"
        );
        Some(selected)
    }

    /// 增加实例连接数，返回是否找到该实例
    pub fn increment_connections(&self, instance_id: &str, instances: &[ServiceInstance]) -> bool {
        match instances.iter().find(|i| i.id == instance_id) {
            Some(instance) => {
                instance.current_connections.increment();
                true
            }
            None => false,
        }
    }

    /// 减少实例连接数，最小为 0
    pub fn decrement_connections(&self, instance_id: &str, instances: &[ServiceInstance]) -> bool {
        match instances.iter().find(|i| i.id == instance_id) {
            Some(instance) => {
                instance.current_connections.decrement();
                true
            }
            None => false,
        }
    }

    /// 占用实例的一个连接名额
    ///
    /// 请求 future 被中途丢弃时同样会释放。
    pub fn reserve(&self, instance: &ServiceInstance) -> ConnectionReservation {
        instance.current_connections.increment();
        ConnectionReservation {
            instance_id: instance.id.clone(),
            counter: instance.current_connections.clone(),
        }
    }

    /// 丢弃服务的游标、会话和统计
    pub async fn forget_service(&self, service_id: &str) {
        self.cursors.write().await.remove(service_id);
        self.sessions.write().await.remove(service_id);
        self.stats.write().await.remove(service_id);
        debug!(service_id = %service_id, "Load balancer state dropped");
    }

    /// 各服务的分布快照
    pub async fn get_stats(&self) -> BalancerStats {
        let stats = self.stats.read().await;
        let sessions = self.sessions.read().await;

        let mut services: Vec<ServiceDistribution> = stats
            .iter()
            .map(|(service_id, selection)| {
                let mut instances: Vec<InstanceDistribution> = selection
                    .instances
                    .iter()
                    .map(|(instance_id, s)| InstanceDistribution {
                        instance_id: instance_id.clone(),
                        url: s.url.clone(),
                        weight: s.weight,
                        selections: s.selections,
                        current_connections: s.connections.get(),
                    })
                    .collect();
                instances.sort_by(|a, b| a.instance_id.cmp(&b.instance_id));
                ServiceDistribution {
                    service_id: service_id.clone(),
                    total_selections: selection.total,
                    sticky_sessions: sessions.get(service_id).map(SessionTable::len).unwrap_or(0),
                    instances,
                }
            })
            .collect();
        services.sort_by(|a, b| a.service_id.cmp(&b.service_id));

        BalancerStats { services }
    }

    async fn next_round_robin(&self, service_id: &str, len: usize) -> usize {
        let cursor = {
            let cursors = self.cursors.read().await;
            cursors.get(service_id).cloned()
        };
        let cursor = match cursor {
            Some(cursor) => cursor,
            None => self
                .cursors
                .write()
                .await
                .entry(service_id.to_string())
                .or_insert_with(|| Arc::new(AtomicUsize::new(0)))
                .clone(),
        };
        cursor.fetch_add(1, Ordering::Relaxed) % len
    }

    async fn record_selection(&self, service_id: &str, instance: &ServiceInstance) {
        let mut stats = self.stats.write().await;
        let service = stats.entry(service_id.to_string()).or_default();
        service.total += 1;

        let entry = service
            .instances
            .entry(instance.id.clone())
            .or_insert_with(|| InstanceSelection {
                url: instance.url.clone(),
                weight: instance.weight,
                selections: 0,
                connections: instance.current_connections.clone(),
            });
        // 端点替换后实例被重建，跟随新的计数器
        if !entry.connections.same_as(&instance.current_connections) {
            entry.connections = instance.current_connections.clone();
            entry.url = instance.url.clone();
            entry.weight = instance.weight;
        }
        entry.selections += 1;
    }
}

/// 按权重随机选择；权重全部相同时返回 None（退化为轮询）
fn weighted_index(instances: &[ServiceInstance]) -> Option<usize> {
    let first = instances.first()?.weight;
    if instances.iter().all(|i| i.weight == first) {
        return None;
    }

    let total: u64 = instances.iter().map(|i| u64::from(i.weight)).sum();
    if total == 0 {
        return None;
    }

    let mut point = rand::thread_rng().gen_range(0..total);
    for (index, instance) in instances.iter().enumerate() {
        let weight = u64::from(instance.weight);
        if point < weight {
            return Some(index);
        }
        point -= weight;
    }
    Some(instances.len() - 1)
}

fn random_index(len: usize) -> usize {
    rand::thread_rng().gen_range(0..len)
}

/// 连接数最少的实例，相同时取列表中靠前的
fn least_connections_index(instances: &[ServiceInstance]) -> usize {
    instances
        .iter()
        .enumerate()
        .min_by_key(|(_, instance)| instance.connections())
        .map(|(index, _)| index)
        .unwrap_or(0)
}

//! 服务实例定义

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::types::EndpointDefinition;

/// 实例的在途连接计数
///
/// 克隆共享同一个计数器：注册中心返回的实例快照与注册中心内部持有的实例
/// 指向同一计数，负载均衡器对快照的增减对所有持有者可见。
/// 端点替换时实例被重建，计数随之归零。
#[derive(Debug, Clone, Default)]
pub struct ConnectionCounter(Arc<AtomicUsize>);

impl ConnectionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    pub fn increment(&self) -> usize {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// 减一，最小为 0
    pub fn decrement(&self) -> usize {
        match self
            .0
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| Some(n.saturating_sub(1)))
        {
            Ok(prev) | Err(prev) => prev.saturating_sub(1),
        }
    }

    /// 是否与另一个计数器是同一个
    pub fn same_as(&self, other: &ConnectionCounter) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Serialize for ConnectionCounter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.get() as u64)
    }
}

/// 服务实例
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInstance {
    /// 实例 ID（服务 ID + 序号）
    pub id: String,
    pub service_id: String,
    pub url: String,
    pub weight: u32,
    pub current_connections: ConnectionCounter,
    /// 最近一次观测到的响应时间（毫秒）
    pub response_time_ms: Option<u64>,
    pub request_count: u64,
    pub error_count: u64,
    /// error_count / max(request_count, 1)
    pub error_rate: f64,
    pub is_healthy: bool,
    pub last_health_check: Option<chrono::DateTime<chrono::Utc>>,
    pub metadata: HashMap<String, String>,
}

impl ServiceInstance {
    /// 由端点定义创建实例，新实例默认健康
    pub fn from_endpoint(service_id: &str, ordinal: usize, endpoint: &EndpointDefinition) -> Self {
        Self {
            id: instance_id(service_id, ordinal),
            service_id: service_id.to_string(),
            url: endpoint.url.trim_end_matches('/').to_string(),
            weight: endpoint.weight,
            current_connections: ConnectionCounter::new(),
            response_time_ms: None,
            request_count: 0,
            error_count: 0,
            error_rate: 0.0,
            is_healthy: true,
            last_health_check: None,
            metadata: endpoint.metadata.clone(),
        }
    }

    /// 当前在途连接数
    pub fn connections(&self) -> usize {
        self.current_connections.get()
    }

    /// 健康检查地址
    pub fn health_url(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    pub(crate) fn apply_metrics(&mut self, metrics: &InstanceMetrics) {
        self.response_time_ms = Some(metrics.response_time_ms);
        self.request_count = metrics.request_count;
        self.error_count = metrics.error_count;
        self.error_rate = metrics.error_count as f64 / metrics.request_count.max(1) as f64;
    }
}

/// 实例 ID 由服务 ID 和端点序号确定性生成
pub fn instance_id(service_id: &str, ordinal: usize) -> String {
    format!("{}-{}", service_id, ordinal)
}

/// 转发器上报的实例指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceMetrics {
    pub response_time_ms: u64,
    pub error_count: u64,
    pub request_count: u64,
}

//! 指标收集模块
//!
//! 统计转发请求总数、成功与失败、最近 1000 个请求的耗时窗口，
//! 以及每个实例累计的请求数和错误数（作为上报注册中心的指标来源）。

use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::registry::InstanceMetrics;

/// 耗时窗口大小
const LATENCY_WINDOW: usize = 1000;

#[derive(Debug, Clone, Copy, Default)]
struct InstanceTally {
    requests: u64,
    errors: u64,
}

/// 指标数据
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    /// 所有上游尝试次数（含重试）
    pub attempts_total: u64,
    pub retries_total: u64,
    pub request_duration_ms: VecDeque<u64>,
    instances: HashMap<String, InstanceTally>,
}

/// 对外展示的指标快照
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub attempts_total: u64,
    pub retries_total: u64,
    pub average_duration_ms: f64,
    pub p95_duration_ms: u64,
}

/// 指标收集器
#[derive(Clone)]
pub struct MetricsCollector {
    metrics: Arc<RwLock<Metrics>>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            metrics: Arc::new(RwLock::new(Metrics::default())),
        }
    }

    /// 记录一次上游尝试，返回该实例的累计指标
    pub async fn record_attempt(
        &self,
        instance_id: &str,
        success: bool,
        duration: Duration,
    ) -> InstanceMetrics {
        let mut metrics = self.metrics.write().await;
        metrics.attempts_total += 1;

        let tally = metrics.instances.entry(instance_id.to_string()).or_default();
        tally.requests += 1;
        if !success {
            tally.errors += 1;
        }

        InstanceMetrics {
            response_time_ms: duration.as_millis() as u64,
            error_count: tally.errors,
            request_count: tally.requests,
        }
    }

    /// 记录一个完整的转发请求
    pub async fn record_request(&self, success: bool, duration: Duration, retries: u32) {
        let mut metrics = self.metrics.write().await;
        metrics.requests_total += 1;
        metrics.retries_total += u64::from(retries);

        if success {
            metrics.requests_success += 1;
        } else {
            metrics.requests_failed += 1;
        }

        metrics
            .request_duration_ms
            .push_back(duration.as_millis() as u64);

        // 只保留最近 1000 个请求的耗时
        if metrics.request_duration_ms.len() > LATENCY_WINDOW {
            metrics.request_duration_ms.pop_front();
        }
    }

    /// 实例被重建或服务被注销后清除其累计值
    pub async fn forget_instances(&self, service_id: &str) {
        let prefix = format!("{}-", service_id);
        let mut metrics = self.metrics.write().await;
        metrics.instances.retain(|id, _| {
            !id.strip_prefix(&prefix)
                .is_some_and(|ordinal| ordinal.chars().all(|c| c.is_ascii_digit()))
        });
    }

    pub async fn get_metrics(&self) -> Metrics {
        self.metrics.read().await.clone()
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let metrics = self.metrics.read().await;
        let window = &metrics.request_duration_ms;

        let average_duration_ms = if window.is_empty() {
            0.0
        } else {
            window.iter().sum::<u64>() as f64 / window.len() as f64
        };
        let p95_duration_ms = {
            let mut sorted: Vec<u64> = window.iter().copied().collect();
            sorted.sort_unstable();
            match sorted.len() {
                0 => 0,
                n => sorted[((n as f64 * 0.95).ceil() as usize).clamp(1, n) - 1],
            }
        };

        MetricsSnapshot {
            requests_total: metrics.requests_total,
            requests_success: metrics.requests_success,
            requests_failed: metrics.requests_failed,
            attempts_total: metrics.attempts_total,
            retries_total: metrics.retries_total,
            average_duration_ms,
            p95_duration_ms,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

//! 健康检查模块
//!
//! 对实例发起 `GET {instance.url}{path}`，在超时时间内返回预期状态码即为健康；
//! 网络错误、超时或非预期状态码均视为不健康。

use futures::future::join_all;
use reqwest::Client as HttpClient;
use tokio::time::timeout;
use tracing::debug;

use crate::registry::config::HealthCheckConfig;
use crate::registry::instance::ServiceInstance;

/// 健康状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }
}

/// 单个实例的检查结果
#[derive(Debug, Clone)]
pub struct HealthCheckResult {
    pub instance_id: String,
    pub status: HealthStatus,
}

/// HTTP 健康检查器
#[derive(Clone, Default)]
pub struct HealthChecker {
    http_client: HttpClient,
}

impl HealthChecker {
    pub fn new(http_client: HttpClient) -> Self {
        Self { http_client }
    }

    /// 检查单个实例
    pub async fn check_instance(
        &self,
        instance: &ServiceInstance,
        policy: &HealthCheckConfig,
    ) -> HealthStatus {
        let url = instance.health_url(&policy.path);

        match timeout(policy.timeout(), self.http_client.get(&url).send()).await {
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                if policy.is_expected(status) {
                    debug!(instance_id = %instance.id, url = %url, status, "Health check passed");
                    HealthStatus::Healthy
                } else {
                    HealthStatus::Unhealthy(format!("unexpected status {}", status))
                }
            }
            Ok(Err(e)) => HealthStatus::Unhealthy(format!("request failed: {}", e)),
            Err(_) => HealthStatus::Unhealthy(format!(
                "timed out after {}ms",
                policy.timeout_ms
            )),
        }
    }

    /// 并发检查一个服务的全部实例
    pub async fn check_all(
        &self,
        instances: &[ServiceInstance],
        policy: &HealthCheckConfig,
    ) -> Vec<HealthCheckResult> {
        let checks = instances.iter().map(|instance| async move {
            HealthCheckResult {
                instance_id: instance.id.clone(),
                status: self.check_instance(instance, policy).await,
            }
        });
        join_all(checks).await
    }
}

//! Kubernetes 服务发现提供者（扩展点）

use async_trait::async_trait;
use tracing::debug;

use crate::discovery::DiscoveryProvider;
use crate::error::Result;
use crate::types::ServiceDefinition;

/// Kubernetes 提供者，当前不返回任何服务
#[derive(Debug, Clone, Default)]
pub struct KubernetesProvider {
    endpoint: Option<String>,
}

impl KubernetesProvider {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }
}

#[async_trait]
impl DiscoveryProvider for KubernetesProvider {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn discover(&self) -> Result<Vec<ServiceDefinition>> {
        debug!(endpoint = ?self.endpoint, "Kubernetes discovery is not implemented, returning no services");
        Ok(Vec::new())
    }
}

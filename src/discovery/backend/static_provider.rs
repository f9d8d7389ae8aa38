//! 静态服务发现提供者

use async_trait::async_trait;

use crate::discovery::DiscoveryProvider;
use crate::error::Result;
use crate::types::ServiceDefinition;

/// 返回配置中声明的服务列表
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    services: Vec<ServiceDefinition>,
}

impl StaticProvider {
    pub fn new(services: Vec<ServiceDefinition>) -> Self {
        Self { services }
    }
}

#[async_trait]
impl DiscoveryProvider for StaticProvider {
    fn name(&self) -> &'static str {
        "static"
    }

    async fn discover(&self) -> Result<Vec<ServiceDefinition>> {
        Ok(self.services.clone())
    }
}

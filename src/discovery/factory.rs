//! 服务发现工厂

use reqwest::Client as HttpClient;
use std::sync::Arc;

use crate::discovery::backend::consul::ConsulProvider;
use crate::discovery::backend::dns::DnsProvider;
use crate::discovery::backend::kubernetes::KubernetesProvider;
use crate::discovery::backend::static_provider::StaticProvider;
use crate::discovery::{DiscoveryProvider, DiscoveryProviderKind, ServiceDiscoveryConfig};

/// 服务发现工厂
pub struct DiscoveryFactory;

impl DiscoveryFactory {
    /// 根据配置创建提供者
    ///
    /// 配置应已通过 `ServiceDiscoveryConfig::validate` 校验。
    pub fn create_provider(
        config: &ServiceDiscoveryConfig,
        http_client: HttpClient,
    ) -> Arc<dyn DiscoveryProvider> {
        match config.provider {
            DiscoveryProviderKind::Consul => Arc::new(ConsulProvider::new(
                http_client,
                config
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| "http://localhost:8500".to_string()),
                config.tags.clone(),
            )),
            DiscoveryProviderKind::Dns => Arc::new(DnsProvider::new(
                config.endpoint.clone().unwrap_or_default(),
            )),
            DiscoveryProviderKind::Kubernetes => {
                Arc::new(KubernetesProvider::new(config.endpoint.clone()))
            }
            DiscoveryProviderKind::Static => Arc::new(StaticProvider::new(config.services.clone())),
        }
    }
}

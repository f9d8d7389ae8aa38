//! DNS 服务发现提供者
//!
//! 解析 `host:port`，每个解析到的地址成为一个端点，服务名取主机名的第一段。

use async_trait::async_trait;
use std::collections::BTreeSet;
use tracing::debug;

use crate::discovery::DiscoveryProvider;
use crate::error::{GatewayError, Result};
use crate::types::{EndpointDefinition, ServiceDefinition};

/// DNS 服务发现提供者
#[derive(Clone)]
pub struct DnsProvider {
    endpoint: String,
}

impl DnsProvider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
        }
    }

    fn service_name(&self) -> Result<String> {
        let (host, _) = self.endpoint.rsplit_once(':').ok_or_else(|| {
            GatewayError::validation(format!("dns endpoint '{}' must be host:port", self.endpoint))
        })?;
        let label = host.split('.').next().unwrap_or(host);
        if label.is_empty() {
            return Err(GatewayError::validation(format!(
                "dns endpoint '{}' has an empty host",
                self.endpoint
            )));
        }
        Ok(label.to_string())
    }
}

#[async_trait]
impl DiscoveryProvider for DnsProvider {
    fn name(&self) -> &'static str {
        "dns"
    }

    async fn discover(&self) -> Result<Vec<ServiceDefinition>> {
        let name = self.service_name()?;
        let addrs = tokio::net::lookup_host(self.endpoint.as_str())
            .await
            .map_err(|e| GatewayError::internal(format!("dns lookup for '{}' failed: {}", self.endpoint, e)))?;

        // 去重并保持稳定顺序
        let urls: BTreeSet<String> = addrs.map(|addr| format!("http://{}", addr)).collect();
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let mut definition = ServiceDefinition::new(name.clone(), name).with_metadata("source", "dns");
        definition.endpoints = urls.into_iter().map(EndpointDefinition::new).collect();

        debug!(
            endpoint = %self.endpoint,
            addresses = definition.endpoints.len(),
            "DNS discovery finished"
        );
        Ok(vec![definition])
    }
}

//! Consul 服务发现提供者
//!
//! 先查询 `/v1/catalog/services` 获取服务名与标签，按配置的标签过滤，
//! 再逐个查询 `/v1/catalog/service/{name}` 得到节点地址。

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::discovery::DiscoveryProvider;
use crate::error::{GatewayError, Result};
use crate::types::{EndpointDefinition, ServiceDefinition};

/// Consul 自身注册的服务名，不作为上游
const CONSUL_SELF_SERVICE: &str = "consul";

/// `/v1/catalog/service/{name}` 返回的节点
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CatalogNode {
    #[serde(default)]
    address: String,
    #[serde(default)]
    service_address: String,
    service_port: u16,
    #[serde(default)]
    service_meta: HashMap<String, String>,
}

impl CatalogNode {
    fn url(&self) -> String {
        let host = if self.service_address.is_empty() {
            &self.address
        } else {
            &self.service_address
        };
        format!("http://{}:{}", host, self.service_port)
    }
}

/// Consul 服务发现提供者
pub struct ConsulProvider {
    http_client: HttpClient,
    consul_url: String,
    tags: Vec<String>,
}

impl ConsulProvider {
    pub fn new(http_client: HttpClient, consul_url: impl Into<String>, tags: Vec<String>) -> Self {
        Self {
            http_client,
            consul_url: consul_url.into().trim_end_matches('/').to_string(),
            tags,
        }
    }

    fn matches_tags(&self, service_tags: &[String]) -> bool {
        self.tags.iter().all(|t| service_tags.contains(t))
    }

    async fn catalog_services(&self) -> Result<HashMap<String, Vec<String>>> {
        let url = format!("{}/v1/catalog/services", self.consul_url);
        let resp = self.http_client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(GatewayError::internal(format!(
                "consul catalog query failed with status {}",
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }

    async fn catalog_service(&self, name: &str) -> Result<Vec<CatalogNode>> {
        let url = format!("{}/v1/catalog/service/{}", self.consul_url, name);
        let resp = self.http_client.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(GatewayError::internal(format!(
                "consul service query for '{}' failed with status {}",
                name,
                resp.status()
            )));
        }
        Ok(resp.json().await?)
    }
}

#[async_trait]
impl DiscoveryProvider for ConsulProvider {
    fn name(&self) -> &'static str {
        "consul"
    }

    async fn discover(&self) -> Result<Vec<ServiceDefinition>> {
        let services = self.catalog_services().await?;

        let mut names: Vec<&String> = services
            .iter()
            .filter(|(name, tags)| name.as_str() != CONSUL_SELF_SERVICE && self.matches_tags(tags))
            .map(|(name, _)| name)
            .collect();
        names.sort();

        let mut definitions = Vec::with_capacity(names.len());
        for name in names {
            let nodes = match self.catalog_service(name).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    // 单个服务查询失败不影响其他服务
                    warn!(service = %name, error = %e, "Consul service lookup failed");
                    continue;
                }
            };
            if nodes.is_empty() {
                continue;
            }

            let mut definition = ServiceDefinition::new(name.clone(), name.clone());
            if let Some(version) = nodes.iter().find_map(|n| n.service_meta.get("version")) {
                definition = definition.with_version(version.clone());
            }
            definition.endpoints = nodes
                .iter()
                .map(|n| {
                    let mut endpoint = EndpointDefinition::new(n.url());
                    endpoint.metadata = n.service_meta.clone();
                    endpoint
                })
                .collect();
            definition = definition.with_metadata("source", "consul");
            definitions.push(definition);
        }

        debug!(count = definitions.len(), "Consul discovery finished");
        Ok(definitions)
    }
}

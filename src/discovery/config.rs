//! 服务发现配置

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::{GatewayError, Result};
use crate::types::ServiceDefinition;

/// 服务发现提供者类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryProviderKind {
    Dns,
    Consul,
    Kubernetes,
    #[default]
    Static,
}

impl fmt::Display for DiscoveryProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiscoveryProviderKind::Dns => "dns",
            DiscoveryProviderKind::Consul => "consul",
            DiscoveryProviderKind::Kubernetes => "kubernetes",
            DiscoveryProviderKind::Static => "static",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for DiscoveryProviderKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dns" | "dns-srv" => Ok(DiscoveryProviderKind::Dns),
            "consul" => Ok(DiscoveryProviderKind::Consul),
            "kubernetes" | "k8s" => Ok(DiscoveryProviderKind::Kubernetes),
            "static" => Ok(DiscoveryProviderKind::Static),
            _ => Err(GatewayError::validation(format!(
                "unknown discovery provider: {}",
                s
            ))),
        }
    }
}

/// 服务发现配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceDiscoveryConfig {
    pub enabled: bool,
    pub provider: DiscoveryProviderKind,
    /// 轮询间隔（毫秒）
    pub polling_interval_ms: u64,
    /// 提供者地址
    ///
    /// - consul: `http://consul:8500`
    /// - dns: `host:port`，服务名取主机名的第一段
    pub endpoint: Option<String>,
    /// 标签过滤，服务必须带有全部标签
    pub tags: Vec<String>,
    /// static 提供者直接返回的服务列表
    pub services: Vec<ServiceDefinition>,
}

impl Default for ServiceDiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: DiscoveryProviderKind::Static,
            polling_interval_ms: 30_000,
            endpoint: None,
            tags: Vec::new(),
            services: Vec::new(),
        }
    }
}

impl ServiceDiscoveryConfig {
    pub fn new(provider: DiscoveryProviderKind) -> Self {
        Self {
            provider,
            ..Self::default()
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn with_polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_service(mut self, definition: ServiceDefinition) -> Self {
        self.services.push(definition);
        self
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms.max(1))
    }

    /// 校验提供者所需的字段
    pub fn validate(&self) -> Result<()> {
        if self.polling_interval_ms == 0 {
            return Err(GatewayError::validation(
                "discovery polling interval must be positive",
            ));
        }
        match self.provider {
            DiscoveryProviderKind::Consul => {
                let endpoint = self.endpoint.as_deref().ok_or_else(|| {
                    GatewayError::validation("consul discovery requires an endpoint")
                })?;
                reqwest::Url::parse(endpoint).map_err(|e| {
                    GatewayError::validation(format!("invalid consul endpoint '{}': {}", endpoint, e))
                })?;
            }
            DiscoveryProviderKind::Dns => {
                let endpoint = self.endpoint.as_deref().ok_or_else(|| {
                    GatewayError::validation("dns discovery requires an endpoint")
                })?;
                if endpoint.rsplit_once(':').is_none() {
                    return Err(GatewayError::validation(format!(
                        "dns endpoint '{}' must be host:port",
                        endpoint
                    )));
                }
            }
            DiscoveryProviderKind::Kubernetes | DiscoveryProviderKind::Static => {}
        }
        Ok(())
    }
}

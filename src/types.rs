//! 服务注册输入类型
//!
//! `ServiceDefinition` 是注册中心的外部输入（来自配置文件、服务发现或管理接口），
//! 被注册中心消费后派生出内部的 `ServiceConfig` 与 `ServiceInstance`。

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// 服务定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub id: String,
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    pub endpoints: Vec<EndpointDefinition>,
    #[serde(default)]
    pub health_check: HealthCheckPolicy,
    /// 路由前缀，缺省为 `/{name}`
    #[serde(default)]
    pub route_prefix: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl ServiceDefinition {
    /// 创建新的服务定义
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version: default_version(),
            endpoints: Vec::new(),
            health_check: HealthCheckPolicy::default(),
            route_prefix: None,
            metadata: HashMap::new(),
        }
    }

    /// 设置版本
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 添加端点（权重 1）
    pub fn with_endpoint(mut self, url: impl Into<String>) -> Self {
        self.endpoints.push(EndpointDefinition::new(url));
        self
    }

    /// 添加带权重的端点
    pub fn with_weighted_endpoint(mut self, url: impl Into<String>, weight: u32) -> Self {
        self.endpoints.push(EndpointDefinition::new(url).with_weight(weight));
        self
    }

    /// 设置健康检查策略
    pub fn with_health_check(mut self, policy: HealthCheckPolicy) -> Self {
        self.health_check = policy;
        self
    }

    /// 设置路由前缀
    pub fn with_route_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.route_prefix = Some(prefix.into());
        self
    }

    /// 添加元数据
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 端点 URL 列表（保持声明顺序）
    pub fn endpoint_urls(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| e.url.clone()).collect()
    }
}

/// 服务端点定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EndpointDefinition {
    pub url: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

fn default_weight() -> u32 {
    1
}

impl EndpointDefinition {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            weight: default_weight(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

/// 健康检查策略
///
/// 时间单位均为毫秒。`expected_status` 中任一状态码都视为健康。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct HealthCheckPolicy {
    pub enabled: bool,
    pub path: String,
    pub interval_ms: u64,
    pub timeout_ms: u64,
    pub expected_status: Vec<u16>,
}

impl Default for HealthCheckPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/health".to_string(),
            interval_ms: 30_000,
            timeout_ms: 5_000,
            expected_status: vec![200],
        }
    }
}

impl HealthCheckPolicy {
    /// 关闭健康检查的策略
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }

    pub fn is_expected(&self, status: u16) -> bool {
        self.expected_status.contains(&status)
    }
}

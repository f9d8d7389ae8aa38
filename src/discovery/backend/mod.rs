//! 服务发现提供者抽象和实现

pub mod consul;
pub mod dns;
pub mod kubernetes;
pub mod static_provider;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::ServiceDefinition;

/// 服务发现提供者 trait
///
/// 所有提供者（Consul、DNS、Kubernetes、static）返回相同形状的服务定义列表，
/// 由注册中心负责合并。未实现的提供者返回空列表而不是报错。
/// 由于需要动态分发（dyn），使用 async-trait
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    /// 提供者名称（用于日志和事件）
    fn name(&self) -> &'static str;

    /// 拉取当前拓扑
    async fn discover(&self) -> Result<Vec<ServiceDefinition>>;
}

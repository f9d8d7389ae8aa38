//! 服务发现模块
//!
//! 从外部系统（Consul、DNS、Kubernetes 或静态配置）拉取拓扑，
//! 以 `ServiceDefinition` 的形式交给注册中心合并。

pub mod backend;
pub mod config;
pub mod factory;

pub use backend::DiscoveryProvider;
pub use backend::consul::ConsulProvider;
pub use backend::dns::DnsProvider;
pub use backend::kubernetes::KubernetesProvider;
pub use backend::static_provider::StaticProvider;
pub use config::{DiscoveryProviderKind, ServiceDiscoveryConfig};
pub use factory::DiscoveryFactory;

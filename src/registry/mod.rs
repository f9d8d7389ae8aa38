//! 服务注册中心模块
//!
//! 维护服务配置、实例健康状态、版本和路径重写规则，
//! 并驱动每个服务的健康检查任务与服务发现轮询。

pub mod config;
pub mod events;
pub mod health;
pub mod instance;
pub mod service_registry;

pub use config::{
    FailoverConfig, HealthCheckConfig, LoadBalancingAlgorithm, LoadBalancingConfig,
    PathRewriteRule, ServiceConfig, ServiceConfigUpdate, ServiceVersionConfig, VersioningConfig,
};
pub use events::{EventBus, RegistryEvent};
pub use health::{HealthCheckResult, HealthChecker, HealthStatus};
pub use instance::{ConnectionCounter, InstanceMetrics, ServiceInstance};
pub use service_registry::{DiscoveryReport, RegistryStats, ServiceRegistry, ServiceStats};

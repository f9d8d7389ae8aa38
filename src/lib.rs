//! Flare Gateway Library
//!
//! API 网关的动态分发核心：服务注册中心、请求路由、负载均衡与故障转移转发，
//! 以及承载它们的 HTTP 服务端和运行时。

pub mod config;
pub mod error;
pub mod types;

// 分发核心
pub mod balancer;
pub mod discovery;
pub mod forwarder;
pub mod registry;
pub mod retry;
pub mod router;

// 可观测性
pub mod metrics;
pub mod observability;
pub mod telemetry;

// HTTP 服务与运行时
pub mod runtime;
pub mod server;

// Re-exports
pub use config::{GatewayConfig, LogFormat, LoggingConfig, ServerConfig};
pub use error::{ErrorCategory, ErrorCode, ErrorEnvelope, GatewayError, Result, UpstreamError};
pub use types::{EndpointDefinition, HealthCheckPolicy, ServiceDefinition};

pub use balancer::{BalancerStats, ConnectionReservation, LoadBalancer, SessionLimits};
pub use discovery::{DiscoveryFactory, DiscoveryProvider, DiscoveryProviderKind, ServiceDiscoveryConfig};
pub use forwarder::{FailoverForwarder, GatewayRequest, GatewayResponse};
pub use registry::{
    LoadBalancingAlgorithm, LoadBalancingConfig, PathRewriteRule, RegistryEvent, RegistryStats,
    ServiceConfig, ServiceInstance, ServiceRegistry, ServiceVersionConfig,
};
pub use retry::{ExponentialBackoffPolicy, RetryPolicy};
pub use router::{RequestRouter, RouteMatch, RouteRequest, RoutingRule};

pub use metrics::{MetricsCollector, MetricsSnapshot};
pub use observability::EventLogger;

pub use runtime::{GatewayRuntime, RuntimeConfig};
pub use server::{AppState, build_router};

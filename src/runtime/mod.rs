//! 网关运行时
//!
//! 组合根：构建注册中心、路由器、负载均衡器、转发器和事件日志任务，
//! 注册配置中的服务与路由规则，启动 HTTP 服务并负责优雅停机。
//!
//! # 使用示例
//!
//! ```rust,no_run
//! use flare_gateway::config::GatewayConfig;
//! use flare_gateway::runtime::GatewayRuntime;
//!
//! # async fn run() -> flare_gateway::error::Result<()> {
//! let config = GatewayConfig::load_from_file("config/gateway.toml")?;
//! let runtime = GatewayRuntime::from_config(config).await?;
//! runtime.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod runtime;

pub use config::RuntimeConfig;
pub use runtime::GatewayRuntime;

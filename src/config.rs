//! 网关配置
//!
//! 从 TOML 文件加载，所有字段都有默认值，缺省文件时使用内置默认配置。

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

use crate::discovery::ServiceDiscoveryConfig;
use crate::error::{GatewayError, Result};
use crate::router::RoutingRule;
use crate::types::ServiceDefinition;

/// 配置文件路径的环境变量
pub const CONFIG_ENV: &str = "FLARE_GATEWAY_CONFIG";
/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub discovery: ServiceDiscoveryConfig,
    pub services: Vec<ServiceDefinition>,
    pub routing_rules: Vec<RoutingRule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// 需要代理的路径前缀
    pub api_prefix: String,
    /// 写入 `x-gateway-version` 的版本号
    pub gateway_version: String,
    /// 请求体大小上限（字节）
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 8080,
            api_prefix: "/api/v1".to_string(),
            gateway_version: env!("CARGO_PKG_VERSION").to_string(),
            body_limit_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.address, self.port)
            .parse()
            .map_err(|e| {
                GatewayError::Config(format!(
                    "invalid listen address {}:{}: {}",
                    self.address, self.port, e
                ))
            })
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认过滤级别，`RUST_LOG` 优先
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl GatewayConfig {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: GatewayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// 按 命令行参数 > 环境变量 > 默认路径 的顺序加载；文件不存在时使用默认配置
    pub fn load(cli_path: Option<String>) -> Result<Self> {
        let explicit = cli_path.or_else(|| std::env::var(CONFIG_ENV).ok());
        match explicit {
            Some(path) => Self::load_from_file(path),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                Self::load_from_file(DEFAULT_CONFIG_PATH)
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.server.socket_addr()?;
        if !self.server.api_prefix.starts_with('/') {
            return Err(GatewayError::Config(format!(
                "api_prefix '{}' must start with '/'",
                self.server.api_prefix
            )));
        }
        if self.server.body_limit_bytes == 0 {
            return Err(GatewayError::Config(
                "body_limit_bytes must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = GatewayConfig::from_toml(
            r#"
            [server]
            port = 9000
            api_prefix = "/api"

            [logging]
            level = "debug"
            format = "json"

            [discovery]
            enabled = false
            provider = "consul"
            endpoint = "http://consul:8500"

            [[services]]
            id = "orders"
            name = "orders"
            endpoints = [{ url = "http://127.0.0.1:9001" }, { url = "http://127.0.0.1:9002", weight = 3 }]

            [services.healthCheck]
            path = "/ping"

            [[routing_rules]]
            id = "legacy"
            priority = 10
            targetService = "orders"
            conditions = { pathPattern = "^/legacy/", methods = ["GET"] }
            "#,
        )
        .expect("parse config");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.address, "0.0.0.0");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.services.len(), 1);
        assert_eq!(config.services[0].endpoints[1].weight, 3);
        assert_eq!(config.services[0].health_check.path, "/ping");
        assert_eq!(config.services[0].health_check.interval_ms, 30_000);
        assert_eq!(config.routing_rules[0].target_service, "orders");
        assert!(config.routing_rules[0].enabled);
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GatewayConfig::from_toml("").expect("parse config");
        assert_eq!(config.server.api_prefix, "/api/v1");
        assert_eq!(config.logging.level, "info");
        assert!(!config.discovery.enabled);
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        let err = GatewayConfig::from_toml("[server]\napi_prefix = \"api\"").expect_err("invalid");
        assert!(matches!(err, GatewayError::Config(_)));
    }
}

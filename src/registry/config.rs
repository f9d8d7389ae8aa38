//! 服务配置定义
//!
//! 每个注册的服务对应一个 `ServiceConfig`，包含上游地址、路由前缀、
//! 路径重写规则以及健康检查、负载均衡、故障转移和版本策略。

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::{GatewayError, Result};
pub use crate::types::HealthCheckPolicy as HealthCheckConfig;

/// 默认请求超时（毫秒）
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
/// 默认重试次数
pub const DEFAULT_RETRIES: u32 = 3;

/// 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub id: String,
    pub name: String,
    pub version: String,
    /// 上游地址列表（与实例一一对应）
    pub upstreams: Vec<String>,
    pub route_prefix: String,
    /// 路径重写规则，按注册顺序应用
    pub rewrite_rules: Vec<PathRewriteRule>,
    pub timeout_ms: u64,
    /// 重试次数上限，故障转移实际重试 `min(retries, failover.max_retries)` 次
    pub retries: u32,
    pub health_check: HealthCheckConfig,
    pub load_balancing: LoadBalancingConfig,
    pub failover: FailoverConfig,
    pub versioning: VersioningConfig,
    pub metadata: HashMap<String, String>,
}

impl ServiceConfig {
    /// 单次转发的超时时间
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// 按注册顺序应用重写规则
    ///
    /// 第一个匹配的规则生效（只替换第一次出现），未匹配的路径原样返回。
    pub fn rewrite_path(&self, path: &str) -> String {
        self.rewrite_rules
            .iter()
            .find_map(|rule| rule.apply(path))
            .unwrap_or_else(|| path.to_string())
    }

    /// 检查路径是否落在本服务的路由前缀下（按路径段边界匹配）
    pub fn matches_prefix(&self, path: &str) -> bool {
        let prefix = self.route_prefix.trim_end_matches('/');
        if prefix.is_empty() {
            return true;
        }
        match path.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'),
            None => false,
        }
    }
}

/// 负载均衡算法
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingAlgorithm {
    /// 轮询
    #[default]
    RoundRobin,
    /// 加权随机（权重相同时退化为轮询）
    Weighted,
    /// 最少连接
    LeastConnections,
    /// 随机
    Random,
}

impl std::str::FromStr for LoadBalancingAlgorithm {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Ok(LoadBalancingAlgorithm::RoundRobin),
            "weighted" | "weighted_random" | "weighted_round_robin" => {
                Ok(LoadBalancingAlgorithm::Weighted)
            }
            "least_connections" | "leastconnections" | "least_conn" => {
                Ok(LoadBalancingAlgorithm::LeastConnections)
            }
            "random" => Ok(LoadBalancingAlgorithm::Random),
            _ => Err(GatewayError::validation(format!(
                "unknown load balancing algorithm: {}",
                s
            ))),
        }
    }
}

/// 负载均衡配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadBalancingConfig {
    pub algorithm: LoadBalancingAlgorithm,
    /// 是否启用会话保持
    pub sticky_sessions: bool,
    /// 会话 ID 所在的请求头
    pub session_header: String,
    /// 会话 ID 所在的 Cookie 名称
    pub session_cookie: String,
}

impl Default for LoadBalancingConfig {
    fn default() -> Self {
        Self {
            algorithm: LoadBalancingAlgorithm::RoundRobin,
            sticky_sessions: false,
            session_header: "x-session-id".to_string(),
            session_cookie: "SESSIONID".to_string(),
        }
    }
}

impl LoadBalancingConfig {
    pub fn with_algorithm(mut self, algorithm: LoadBalancingAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_sticky_sessions(mut self, enabled: bool) -> Self {
        self.sticky_sessions = enabled;
        self
    }
}

/// 故障转移配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FailoverConfig {
    pub enabled: bool,
    pub max_retries: u32,
    /// 基础重试延迟（毫秒）
    pub retry_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_retries: 3,
            retry_delay_ms: 1_000,
            backoff_multiplier: 2.0,
        }
    }
}

/// 版本策略配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct VersioningConfig {
    pub enabled: bool,
    /// 携带版本号的请求头
    pub header: String,
    pub default_version: Option<String>,
}

impl Default for VersioningConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            header: "x-api-version".to_string(),
            default_version: None,
        }
    }
}

/// 路径重写规则
///
/// `pattern` 是正则表达式，`replacement` 支持 `$1` 风格的捕获组引用。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawRewriteRule", into = "RawRewriteRule")]
pub struct PathRewriteRule {
    pattern: String,
    replacement: String,
    regex: Regex,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawRewriteRule {
    pattern: String,
    replacement: String,
}

impl TryFrom<RawRewriteRule> for PathRewriteRule {
    type Error = GatewayError;

    fn try_from(raw: RawRewriteRule) -> Result<Self> {
        PathRewriteRule::new(raw.pattern, raw.replacement)
    }
}

impl From<PathRewriteRule> for RawRewriteRule {
    fn from(rule: PathRewriteRule) -> Self {
        RawRewriteRule {
            pattern: rule.pattern,
            replacement: rule.replacement,
        }
    }
}

impl PathRewriteRule {
    /// 创建重写规则，模式必须是合法的正则表达式
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.is_empty() {
            return Err(GatewayError::validation("rewrite pattern must not be empty"));
        }
        let regex = Regex::new(&pattern)?;
        Ok(Self {
            pattern,
            replacement: replacement.into(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// 规则匹配时返回重写后的路径
    pub fn apply(&self, path: &str) -> Option<String> {
        if self.regex.is_match(path) {
            Some(self.regex.replace(path, self.replacement.as_str()).into_owned())
        } else {
            None
        }
    }
}

/// 服务版本配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceVersionConfig {
    pub service_id: String,
    pub version: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub deprecation_date: Option<chrono::DateTime<chrono::Utc>>,
}

fn default_true() -> bool {
    true
}

impl ServiceVersionConfig {
    pub fn new(service_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            version: version.into(),
            is_default: false,
            is_active: true,
            deprecation_date: None,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

/// 服务配置的部分更新
///
/// 只有 `Some` 的字段会被写入。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceConfigUpdate {
    pub version: Option<String>,
    pub route_prefix: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<u32>,
    pub health_check: Option<HealthCheckConfig>,
    pub load_balancing: Option<LoadBalancingConfig>,
    pub failover: Option<FailoverConfig>,
    pub versioning: Option<VersioningConfig>,
    pub metadata: Option<HashMap<String, String>>,
}

//! 网关统一错误类型

use super::code::ErrorCode;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// 默认的重试等待提示（秒），用于 503 响应
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// 单次上游调用失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpstreamErrorKind {
    /// 超时（请求超时或 deadline 到期）
    Timeout,
    /// 连接被拒绝 / 无法建立连接
    ConnectionRefused,
    /// 域名解析失败
    DnsFailure,
    /// 上游返回了可重试的状态码（502/503/504）
    BadStatus,
    /// 其他错误（请求构造、响应体读取等）
    Other,
}

impl UpstreamErrorKind {
    /// 该类失败是否应将实例标记为不健康
    pub fn marks_unhealthy(&self) -> bool {
        matches!(
            self,
            UpstreamErrorKind::Timeout
                | UpstreamErrorKind::ConnectionRefused
                | UpstreamErrorKind::DnsFailure
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            UpstreamErrorKind::Timeout => ErrorCode::UpstreamTimeout,
            UpstreamErrorKind::ConnectionRefused => ErrorCode::ConnectionRefused,
            UpstreamErrorKind::DnsFailure => ErrorCode::DnsFailure,
            UpstreamErrorKind::BadStatus | UpstreamErrorKind::Other => ErrorCode::ForwardingFailed,
        }
    }
}

/// 单次转发尝试的失败信息
#[derive(Debug, Clone, Serialize)]
pub struct UpstreamError {
    pub kind: UpstreamErrorKind,
    pub instance_id: String,
    pub message: String,
}

impl UpstreamError {
    pub fn new(kind: UpstreamErrorKind, instance_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            instance_id: instance_id.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for UpstreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] instance {}: {}", self.kind.code(), self.instance_id, self.message)
    }
}

/// 网关统一错误类型
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// 没有匹配的路由规则或前缀
    #[error("no route matches {method} {path}")]
    RouteNotFound { method: String, path: String },

    /// 没有健康实例，或负载均衡选择失败
    #[error("service '{service}' is unavailable: {reason}")]
    ServiceUnavailable {
        service: String,
        reason: String,
        retry_after: u64,
    },

    /// 所有重试尝试均失败
    #[error("forwarding to '{service}' failed after {attempts} attempt(s): {last_error}")]
    Forwarding {
        service: String,
        attempts: u32,
        last_error: UpstreamError,
    },

    /// 注册或规则输入不合法
    #[error("validation failed: {0}")]
    Validation(String),

    /// 重复的规则 ID 等冲突
    #[error("conflict: {0}")]
    Conflict(String),

    /// 引用了不存在的服务、规则或版本
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// 配置加载错误
    #[error("configuration error: {0}")]
    Config(String),

    /// 内部错误（不对外暴露细节）
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn route_not_found(method: impl Into<String>, path: impl Into<String>) -> Self {
        GatewayError::RouteNotFound {
            method: method.into(),
            path: path.into(),
        }
    }

    pub fn service_unavailable(service: impl Into<String>, reason: impl Into<String>) -> Self {
        GatewayError::ServiceUnavailable {
            service: service.into(),
            reason: reason.into(),
            retry_after: DEFAULT_RETRY_AFTER_SECS,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GatewayError::Validation(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        GatewayError::Conflict(msg.into())
    }

    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        GatewayError::NotFound { kind, id: id.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// 获取错误代码
    pub fn code(&self) -> ErrorCode {
        match self {
            GatewayError::RouteNotFound { .. } => ErrorCode::RouteNotFound,
            GatewayError::ServiceUnavailable { .. } => ErrorCode::ServiceUnavailable,
            GatewayError::Forwarding { .. } => ErrorCode::ForwardingFailed,
            GatewayError::Validation(_) => ErrorCode::ValidationError,
            GatewayError::Conflict(_) => ErrorCode::Conflict,
            GatewayError::NotFound { .. } => ErrorCode::NotFound,
            GatewayError::Config(_) => ErrorCode::ConfigurationError,
            GatewayError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// 对应的 HTTP 状态码
    pub fn http_status(&self) -> http::StatusCode {
        self.code().http_status()
    }

    /// 503 响应的 Retry-After 提示
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            GatewayError::ServiceUnavailable { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// 可以对外展示的错误信息
    ///
    /// 内部错误只返回通用信息；转发失败只给出尝试次数和失败类别，
    /// 上游地址等原始错误链只进日志。
    pub fn public_message(&self) -> String {
        match self {
            GatewayError::Internal(_) | GatewayError::Config(_) => {
                "Internal server error".to_string()
            }
            GatewayError::Forwarding {
                service,
                attempts,
                last_error,
            } => format!(
                "forwarding to '{}' failed after {} attempt(s): {}",
                service,
                attempts,
                last_error.kind.code().as_str()
            ),
            other => other.to_string(),
        }
    }
}

/// 结果类型别名
pub type Result<T> = std::result::Result<T, GatewayError>;

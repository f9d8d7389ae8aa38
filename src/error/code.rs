//! 错误代码和错误类别定义
//!
//! 网关错误码按类别分组，每个类别占用 1000 个代码范围：
//! - 1000-1999: 路由相关错误
//! - 2000-2999: 上游转发相关错误
//! - 3000-3999: 请求校验相关错误
//! - 4000-4999: 资源（服务、规则、版本）相关错误
//! - 6000-6999: 系统相关错误

use serde::{Deserialize, Serialize};
use std::fmt;

/// 错误代码枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u32)]
pub enum ErrorCode {
    // ============================================================
    // 路由相关错误 (1000-1999)
    // ============================================================
    RouteNotFound = 1000,

    // ============================================================
    // 上游转发相关错误 (2000-2999)
    // ============================================================
    ServiceUnavailable = 2000,
    ForwardingFailed = 2001,
    UpstreamTimeout = 2002,
    ConnectionRefused = 2003,
    DnsFailure = 2004,

    // ============================================================
    // 请求校验相关错误 (3000-3999)
    // ============================================================
    ValidationError = 3000,

    // ============================================================
    // 资源相关错误 (4000-4999)
    // ============================================================
    NotFound = 4000,
    Conflict = 4001,

    // ============================================================
    // 系统相关错误 (6000-6999)
    // ============================================================
    InternalError = 6000,
    ConfigurationError = 6001,
}

impl ErrorCode {
    /// 获取错误代码的数字值
    #[inline]
    pub fn as_u32(&self) -> u32 {
        *self as u32
    }

    /// 获取错误代码的英文标识符
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::RouteNotFound => "ROUTE_NOT_FOUND",
            ErrorCode::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorCode::ForwardingFailed => "FORWARDING_ERROR",
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",
            ErrorCode::ConnectionRefused => "CONNECTION_REFUSED",
            ErrorCode::DnsFailure => "DNS_FAILURE",
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::ConfigurationError => "CONFIGURATION_ERROR",
        }
    }

    /// 对应的 HTTP 状态码
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            ErrorCode::RouteNotFound | ErrorCode::NotFound => http::StatusCode::NOT_FOUND,
            ErrorCode::ServiceUnavailable => http::StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::ForwardingFailed
            | ErrorCode::ConnectionRefused
            | ErrorCode::DnsFailure => http::StatusCode::BAD_GATEWAY,
            ErrorCode::UpstreamTimeout => http::StatusCode::GATEWAY_TIMEOUT,
            ErrorCode::ValidationError => http::StatusCode::BAD_REQUEST,
            ErrorCode::Conflict => http::StatusCode::CONFLICT,
            ErrorCode::InternalError | ErrorCode::ConfigurationError => {
                http::StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// 获取错误代码的类别
    pub fn category(&self) -> ErrorCategory {
        match self.as_u32() {
            1000..=1999 => ErrorCategory::Routing,
            2000..=2999 => ErrorCategory::Upstream,
            3000..=3999 => ErrorCategory::Validation,
            4000..=4999 => ErrorCategory::Resource,
            _ => ErrorCategory::System,
        }
    }

    /// 判断是否为可重试的错误（单次转发尝试层面）
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorCode::ServiceUnavailable
                | ErrorCode::UpstreamTimeout
                | ErrorCode::ConnectionRefused
                | ErrorCode::DnsFailure
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Routing,
    Upstream,
    Validation,
    Resource,
    System,
}

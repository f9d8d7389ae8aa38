//! 统一的 JSON 错误响应结构
//!
//! 所有向外传播的错误都会被规范化为：
//! `{success:false, error, message, correlationId, timestamp}`

use super::GatewayError;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

/// 错误响应信封
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    /// 错误代码标识符
    pub error: String,
    pub message: String,
    pub correlation_id: String,
    /// RFC 3339 时间戳
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorEnvelope {
    pub fn from_error(error: &GatewayError, correlation_id: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.code().as_str().to_string(),
            message: error.public_message(),
            correlation_id: correlation_id.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            retry_after: error.retry_after(),
        }
    }
}

/// 携带关联 ID 的错误，可直接转换为 HTTP 响应
#[derive(Debug)]
pub struct ErrorResponse {
    pub error: GatewayError,
    pub correlation_id: String,
}

impl ErrorResponse {
    pub fn new(error: GatewayError, correlation_id: impl Into<String>) -> Self {
        Self {
            error,
            correlation_id: correlation_id.into(),
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        let status = self.error.http_status();
        let envelope = ErrorEnvelope::from_error(&self.error, &self.correlation_id);
        let retry_after = envelope.retry_after;

        let mut response = (status, Json(envelope)).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.correlation_id) {
            response.headers_mut().insert("x-correlation-id", value);
        }
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

//! 网关错误处理模块
//!
//! 提供统一的错误类型、错误代码分类以及 JSON 错误信封

pub mod code;
pub mod conversions;
pub mod envelope;
pub mod gateway_error;

pub use code::{ErrorCategory, ErrorCode};
pub use envelope::{ErrorEnvelope, ErrorResponse};
pub use gateway_error::{
    DEFAULT_RETRY_AFTER_SECS, GatewayError, Result, UpstreamError, UpstreamErrorKind,
};

//! 错误类型转换实现

use super::GatewayError;
use std::io;

impl From<io::Error> for GatewayError {
    fn from(err: io::Error) -> Self {
        GatewayError::Internal(format!("IO error: {}", err))
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Validation(format!("invalid JSON: {}", err))
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::Config(format!("invalid TOML: {}", err))
    }
}

impl From<regex::Error> for GatewayError {
    fn from(err: regex::Error) -> Self {
        GatewayError::Validation(format!("invalid pattern: {}", err))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Internal(format!("HTTP client error: {}", err))
    }
}

//! 重试策略模块

pub mod exponential;

pub use exponential::ExponentialBackoffPolicy;

use std::time::Duration;

use crate::error::UpstreamError;

/// 重试策略 trait
///
/// `attempt` 从 0 开始计数，表示刚刚失败的那次尝试。
pub trait RetryPolicy: Send + Sync {
    fn should_retry(&self, attempt: u32, error: &UpstreamError) -> bool;
    fn backoff_duration(&self, attempt: u32) -> Duration;
    /// 总尝试次数（首次 + 重试）
    fn max_attempts(&self) -> u32;
}

use super::RetryPolicy;
use std::time::Duration;

use crate::error::UpstreamError;
use crate::registry::{FailoverConfig, ServiceConfig};

/// 单次退避的上限
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// 指数退避重试策略
///
/// 第 n 次失败后的等待时间为 `base_delay * multiplier^n`。
#[derive(Debug, Clone)]
pub struct ExponentialBackoffPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl ExponentialBackoffPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: if multiplier.is_finite() && multiplier >= 1.0 {
                multiplier
            } else {
                1.0
            },
            max_delay: MAX_BACKOFF,
        }
    }

    /// 由服务的故障转移配置构建；关闭故障转移时只尝试一次
    pub fn from_failover(config: &FailoverConfig) -> Self {
        let attempts = if config.enabled {
            config.max_retries.saturating_add(1)
        } else {
            1
        };
        Self::new(
            attempts,
            Duration::from_millis(config.retry_delay_ms),
            config.backoff_multiplier,
        )
    }

    /// 由服务配置构建，`retries` 是故障转移重试次数的上限
    pub fn for_service(config: &ServiceConfig) -> Self {
        let failover = FailoverConfig {
            max_retries: config.failover.max_retries.min(config.retries),
            ..config.failover.clone()
        };
        Self::from_failover(&failover)
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn should_retry(&self, attempt: u32, _error: &UpstreamError) -> bool {
        // 每一类失败都换实例重试，是否标记不健康由调用方决定
        attempt.saturating_add(1) < self.max_attempts
    }

    fn backoff_duration(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.powi(attempt.min(16) as i32);
        let delay_ms = self.base_delay.as_millis() as f64 * factor;
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }

    fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{UpstreamError, UpstreamErrorKind};

    #[test]
    fn test_backoff_grows_by_multiplier() {
        let policy = ExponentialBackoffPolicy::from_failover(&FailoverConfig::default());
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.backoff_duration(0), Duration::from_millis(1000));
        assert_eq!(policy.backoff_duration(1), Duration::from_millis(2000));
        assert_eq!(policy.backoff_duration(2), Duration::from_millis(4000));
    }

    #[test]
    fn test_disabled_failover_makes_one_attempt() {
        let config = FailoverConfig {
            enabled: false,
            ..FailoverConfig::default()
        };
        let policy = ExponentialBackoffPolicy::from_failover(&config);
        let error = UpstreamError::new(UpstreamErrorKind::Timeout, "svc-0", "timed out");
        assert_eq!(policy.max_attempts(), 1);
        assert!(!policy.should_retry(0, &error));
    }
}

//! 重试机制（有界指数退避策略）

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次）
    pub max_attempts: u32,
    /// 初始延迟（毫秒）
    pub initial_delay_ms: u64,
    /// 最大延迟（毫秒）
    pub max_delay_ms: u64,
    /// 退避倍数
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 100,
            max_delay_ms: 2_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 从配置创建重试策略，未配置的字段使用默认值
    pub fn from_config(
        max_attempts: Option<u32>,
        initial_delay_ms: Option<u64>,
        max_delay_ms: Option<u64>,
    ) -> Self {
        let defaults = Self::default();
        Self {
            max_attempts: max_attempts.unwrap_or(defaults.max_attempts).max(1),
            initial_delay_ms: initial_delay_ms.unwrap_or(defaults.initial_delay_ms),
            max_delay_ms: max_delay_ms.unwrap_or(defaults.max_delay_ms),
            backoff_multiplier: defaults.backoff_multiplier,
        }
    }

    /// 计算第 `attempt` 次失败后的等待时间（attempt 从 0 开始）
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay_ms = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32))
            .min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

/// 按策略重试异步操作，超过最大次数后返回最后一次的错误
pub async fn execute_with_retry<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match f().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 >= max_attempts => {
                tracing::warn!(
                    operation = %operation,
                    attempts = attempt + 1,
                    error = %err,
                    "Giving up after max retry attempts"
                );
                return Err(err);
            }
            Err(err) => {
                let delay = policy.calculate_delay(attempt);
                tracing::debug!(
                    operation = %operation,
                    attempt = attempt + 1,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_grows_exponentially_and_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 100,
            max_delay_ms: 300,
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(300));
        assert_eq!(policy.calculate_delay(6), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::from_config(Some(3), Some(10), Some(50));

        let result: Result<(), String> = execute_with_retry(&policy, "connect", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("connection refused".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_first_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::default();

        let result: Result<u32, String> = execute_with_retry(&policy, "connect", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move { if n == 0 { Err("flaky".to_string()) } else { Ok(n) } }
        })
        .await;

        assert_eq!(result, Ok(1));
    }
}

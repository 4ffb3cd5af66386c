//! 指数退避重试
//!
//! RetryExecutor 包装任意可失败的异步操作：第 1 次失败后等待 initial_delay，
//! 之后每次乘以 backoff_multiplier，封顶 max_delay；不可重试的错误立即返回。
//! 退避等待与操作本身都与取消令牌竞争，取消后立即返回。

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, ToolError};

/// 重试参数（构造后不可变）
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// 校验后构造：max_attempts >= 1，backoff_multiplier >= 1，max_delay >= initial_delay
    pub fn new(
        max_attempts: u32,
        initial_delay: Duration,
        backoff_multiplier: f64,
        max_delay: Duration,
    ) -> Result<Self, AgentError> {
        if max_attempts < 1 {
            return Err(AgentError::Config("retry.max_attempts must be >= 1".into()));
        }
        if !backoff_multiplier.is_finite() || backoff_multiplier < 1.0 {
            return Err(AgentError::Config(
                "retry.backoff_multiplier must be a finite number >= 1.0".into(),
            ));
        }
        if max_delay < initial_delay {
            return Err(AgentError::Config(
                "retry.max_delay must not be smaller than retry.initial_delay".into(),
            ));
        }
        Ok(Self {
            max_attempts,
            initial_delay,
            backoff_multiplier,
            max_delay,
        })
    }

    /// 只尝试一次
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// 给定当前等待时长，计算下一次等待时长（封顶 max_delay）
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next = current.as_secs_f64() * self.backoff_multiplier;
        let cap = self.max_delay.as_secs_f64();
        if !next.is_finite() || next >= cap {
            self.max_delay
        } else {
            Duration::from_secs_f64(next)
        }
    }

    /// 退避序列：第 i 项是第 i 次失败后的等待时长（无限序列）
    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        let first = self.initial_delay.min(self.max_delay);
        std::iter::successors(Some(first), move |d| Some(self.next_delay(*d)))
    }
}

/// 错误是否值得重试
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for ToolError {
    fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

/// 重试结束仍未成功
#[derive(Debug, Clone, PartialEq)]
pub enum RetryError<E> {
    /// 次数耗尽或遇到不可重试错误，携带最后一次错误与已尝试次数
    Failed { last: E, attempts: u32 },
    /// 被取消（等待期间或操作进行中）
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Failed { attempts, .. } | RetryError::Cancelled { attempts } => *attempts,
        }
    }
}

/// 带退避的重试执行器
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// 执行 op 直到成功、遇到不可重试错误、次数耗尽或被取消。
    /// 成功时返回 (结果, 实际尝试次数)。
    pub async fn execute<T, E, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<(T, u32), RetryError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut delays = self.config.delays();
        let mut attempt: u32 = 1;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts: attempt - 1,
                });
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                r = op() => r,
            };

            let err = match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(op = label, attempt, "succeeded after retry");
                    }
                    return Ok((value, attempt));
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                tracing::debug!(op = label, attempt, error = %err, "non-retryable failure");
                return Err(RetryError::Failed {
                    last: err,
                    attempts: attempt,
                });
            }
            if attempt >= max_attempts {
                tracing::error!(op = label, attempts = attempt, error = %err, "giving up after retries");
                return Err(RetryError::Failed {
                    last: err,
                    attempts: attempt,
                });
            }

            let delay = delays.next().unwrap_or(self.config.max_delay);
            tracing::warn!(
                op = label,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return Err(RetryError::Cancelled { attempts: attempt });
                }
                _ = tokio::time::sleep(delay) => {}
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn secs(v: &[u64]) -> Vec<Duration> {
        v.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    fn cfg(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(
            max_attempts,
            Duration::from_secs(1),
            2.0,
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn test_delay_sequence_is_capped() {
        let c = cfg(10);
        let got: Vec<Duration> = c.delays().take(7).collect();
        assert_eq!(got, secs(&[1, 2, 4, 8, 10, 10, 10]));
    }

    #[test]
    fn test_config_validation() {
        assert!(RetryConfig::new(0, Duration::ZERO, 2.0, Duration::ZERO).is_err());
        assert!(RetryConfig::new(1, Duration::ZERO, 0.5, Duration::ZERO).is_err());
        assert!(RetryConfig::new(1, Duration::from_secs(5), 2.0, Duration::from_secs(1)).is_err());
        assert!(RetryConfig::new(1, Duration::ZERO, 1.0, Duration::ZERO).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = RetryExecutor::new(cfg(3));
        let token = CancellationToken::new();
        let start = Instant::now();

        let c = calls.clone();
        let result = exec
            .execute("flaky", &token, || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(ToolError::Transient("flaky".into()))
                    } else {
                        Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(("ok", 3)));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1s + 2s 退避
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let exec = RetryExecutor::new(cfg(2));
        let token = CancellationToken::new();
        let result: Result<((), u32), _> = exec
            .execute("down", &token, || async {
                Err(ToolError::Transient("still down".into()))
            })
            .await;
        assert_eq!(
            result,
            Err(RetryError::Failed {
                last: ToolError::Transient("still down".into()),
                attempts: 2
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let exec = RetryExecutor::new(cfg(5));
        let token = CancellationToken::new();
        let c = calls.clone();
        let result: Result<((), u32), _> = exec
            .execute("bad", &token, || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(ToolError::InvalidArgs("nope".into()))
                }
            })
            .await;
        assert_eq!(result.unwrap_err().attempts(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_interrupts_backoff() {
        let exec = RetryExecutor::new(
            RetryConfig::new(5, Duration::from_secs(60), 2.0, Duration::from_secs(60)).unwrap(),
        );
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let result: Result<((), u32), _> = exec
            .execute("slow", &token, || async {
                Err(ToolError::Transient("down".into()))
            })
            .await;
        assert_eq!(result, Err(RetryError::Cancelled { attempts: 1 }));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}

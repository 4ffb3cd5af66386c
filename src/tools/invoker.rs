//! 工具调用器
//!
//! 持有只读 ToolRegistry、重试参数与单次调用超时。invoke(name, args) 先查表、校验参数，
//! 再在 RetryExecutor 内带超时调用工具；任何错误都转为 `ToolResult::Failure`，绝不向上抛出。
//! 每次调用输出一条结构化审计日志（JSON）。

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::core::{RetryConfig, RetryError, RetryExecutor, ToolError};
use crate::tools::{Invocation, ToolArgs, ToolRegistry, ToolResult};

const ARGS_PREVIEW_CHARS: usize = 200;

/// 工具调用器：查表 + 参数校验 + 超时 + 重试
pub struct ToolInvoker {
    registry: Arc<ToolRegistry>,
    retry: RetryConfig,
    timeout: Duration,
}

impl ToolInvoker {
    pub fn new(registry: Arc<ToolRegistry>, retry: RetryConfig) -> Self {
        Self {
            registry,
            retry,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// 使用构造时的重试参数调用工具
    pub async fn invoke(&self, name: &str, args: &ToolArgs, cancel: &CancellationToken) -> ToolResult {
        self.invoke_counted(name, args, cancel).await.result
    }

    /// 同 invoke，同时返回重试次数
    pub async fn invoke_counted(
        &self,
        name: &str,
        args: &ToolArgs,
        cancel: &CancellationToken,
    ) -> Invocation {
        self.invoke_with(name, args, &self.retry, cancel).await
    }

    /// 单次调用覆盖重试参数
    pub async fn invoke_with(
        &self,
        name: &str,
        args: &ToolArgs,
        retry: &RetryConfig,
        cancel: &CancellationToken,
    ) -> Invocation {
        let start = Instant::now();

        let tool = match self.registry.lookup(name) {
            Ok(t) => t,
            Err(e) => return finish(name, args, start, e.into(), 0),
        };
        // 参数错误重试无意义
        if let Err(e) = self.registry.validate_args(name, args) {
            return finish(name, args, start, e.into(), 0);
        }

        let timeout = self.timeout;
        let executor = RetryExecutor::new(retry.clone());
        let outcome = executor
            .execute(name, cancel, || {
                let tool = tool.clone();
                async move {
                    // panic 视为永久失败，不重试
                    let attempt = AssertUnwindSafe(tool.execute(args)).catch_unwind();
                    match tokio::time::timeout(timeout, attempt).await {
                        Ok(Ok(r)) => r,
                        Ok(Err(payload)) => Err(ToolError::Permanent(format!(
                            "tool panicked: {}",
                            panic_message(payload.as_ref())
                        ))),
                        Err(_) => Err(ToolError::Timeout(timeout)),
                    }
                }
            })
            .await;

        let (result, attempts) = match outcome {
            Ok((value, attempts)) => (ToolResult::success(value), attempts),
            Err(RetryError::Failed { last, attempts }) => (last.into(), attempts),
            Err(RetryError::Cancelled { attempts }) => (ToolResult::cancelled(), attempts),
        };
        finish(name, args, start, result, attempts.saturating_sub(1))
    }
}

fn finish(name: &str, args: &ToolArgs, start: Instant, result: ToolResult, retries: u32) -> Invocation {
    let outcome = result.kind().unwrap_or("ok");
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": name,
        "ok": result.is_success(),
        "outcome": outcome,
        "retries": retries,
        "duration_ms": start.elapsed().as_millis() as u64,
        "args_preview": args_preview(args),
    });
    tracing::info!(audit = %audit, "tool");
    Invocation { result, retries }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn args_preview(args: &ToolArgs) -> String {
    let s = serde_json::Value::Object(args.clone()).to_string();
    if s.chars().count() > ARGS_PREVIEW_CHARS {
        format!("{}...", s.chars().take(ARGS_PREVIEW_CHARS).collect::<String>())
    } else {
        s
    }
}

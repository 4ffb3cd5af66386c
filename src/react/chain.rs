//! 链式执行：按顺序执行计划中的每一步，汇总结果与逐行摘要
//!
//! 步骤严格串行（后面的步骤由模型在知道前面结果的前提下编排）。某一步失败只记录为数据，
//! 其余步骤照常执行；只有取消这类非工具失败才会提前结束。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::AgentError;
use crate::react::planner::{Plan, PlanStep};
use crate::tools::{ToolInvoker, ToolResult};

pub const NO_TOOLS_SUMMARY: &str = "No tools needed.";

/// 一次计划执行的结果；summary 每步一行，顺序与 results 一致
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub results: Vec<ToolResult>,
    pub summary: String,
}

impl ExecutionResult {
    pub fn no_tools() -> Self {
        Self {
            results: Vec::new(),
            summary: NO_TOOLS_SUMMARY.to_string(),
        }
    }

    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.is_success()).count()
    }
}

/// 摘要中的一行：`Step {i} ({tool}): {value}` 或 `Step {i} ({tool}): ERROR - {message}`
pub fn summary_line(index: usize, tool: &str, result: &ToolResult) -> String {
    match result {
        ToolResult::Success { value } => format!("Step {index} ({tool}): {}", render_value(value)),
        ToolResult::Failure { message, .. } => {
            format!("Step {index} ({tool}): ERROR - {}", single_line(message))
        }
    }
}

/// 字符串原样输出，其它值输出紧凑 JSON；保证不含换行
pub fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => single_line(s),
        other => other.to_string(),
    }
}

fn single_line(s: &str) -> String {
    s.lines().map(str::trim_end).collect::<Vec<_>>().join(" ")
}

/// 链式执行器
pub struct ChainExecutor {
    invoker: Arc<ToolInvoker>,
}

impl ChainExecutor {
    pub fn new(invoker: Arc<ToolInvoker>) -> Self {
        Self { invoker }
    }

    pub async fn execute_plan(
        &self,
        plan: &Plan,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, AgentError> {
        self.run(plan.steps(), cancel).await
    }

    /// 依次执行所有步骤；空步骤列表直接返回 "No tools needed."
    pub async fn run(
        &self,
        steps: &[PlanStep],
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, AgentError> {
        if steps.is_empty() {
            return Ok(ExecutionResult::no_tools());
        }

        let total = steps.len();
        let mut results = Vec::with_capacity(total);
        let mut lines = Vec::with_capacity(total);

        for (i, step) in steps.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(AgentError::Cancelled);
            }
            tracing::info!(step = i + 1, total, tool = %step.tool, "executing chain step");

            let result = self.invoker.invoke(&step.tool, &step.args, cancel).await;
            if cancel.is_cancelled() && result.kind() == Some("cancelled") {
                return Err(AgentError::Cancelled);
            }

            lines.push(summary_line(i + 1, &step.tool, &result));
            results.push(result);
        }

        Ok(ExecutionResult {
            results,
            summary: lines.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RetryConfig, ToolError};
    use crate::tools::{ParamSchema, ToolArgs, ToolRegistry};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn executor(registry: ToolRegistry) -> ChainExecutor {
        ChainExecutor::new(Arc::new(ToolInvoker::new(
            Arc::new(registry),
            RetryConfig::no_retry(),
        )))
    }

    fn step(tool: &str) -> PlanStep {
        PlanStep::new(tool, ToolArgs::new())
    }

    #[tokio::test]
    async fn test_empty_plan_invokes_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let mut reg = ToolRegistry::new();
        reg.register_fn("count", "Counts.", ParamSchema::new(), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(json!(1))
        });
        let out = executor(reg)
            .execute_plan(&Plan::AnswerDirect, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, ExecutionResult::no_tools());
        assert_eq!(out.summary, "No tools needed.");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_steps_run_in_order_and_failures_do_not_abort() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut reg = ToolRegistry::new();
        for name in ["a", "b", "c"] {
            let order = order.clone();
            reg.register_fn(name, "Records its call.", ParamSchema::new(), move |_| {
                order.lock().unwrap().push(name);
                if name == "b" {
                    Err(ToolError::Permanent("b is broken".into()))
                } else {
                    Ok(json!({ "from": name }))
                }
            });
        }

        let steps = vec![step("a"), step("b"), step("missing"), step("c")];
        let out = executor(reg)
            .run(&steps, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.results.len(), 4);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b", "c"]);
        let lines: Vec<&str> = out.summary.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"Step 1 (a): {"from":"a"}"#,
                "Step 2 (b): ERROR - b is broken",
                "Step 3 (missing): ERROR - Unknown tool: missing",
                r#"Step 4 (c): {"from":"c"}"#,
            ]
        );
        assert_eq!(out.failures(), 2);
        assert_eq!(out.results[2].kind(), Some("unknown_tool"));
    }

    #[tokio::test]
    async fn test_single_step_has_same_shape() {
        let mut reg = ToolRegistry::new();
        reg.register_fn("say", "Says.", ParamSchema::new(), |_| Ok(json!("multi\nline")));
        let out = executor(reg)
            .execute_plan(&Plan::UseTool(step("say")), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.summary, "Step 1 (say): multi line");
    }

    #[tokio::test]
    async fn test_cancelled_chain_stops() {
        let mut reg = ToolRegistry::new();
        reg.register_fn("a", "A.", ParamSchema::new(), |_| Ok(json!(1)));
        let token = CancellationToken::new();
        token.cancel();
        let err = executor(reg).run(&[step("a"), step("a")], &token).await.unwrap_err();
        assert!(matches!(err, AgentError::Cancelled));
    }
}
